//! [`ReportSnapshot`] -> legacy document, patched onto the document it was imported from.

use std::collections::BTreeMap;

use mrt_model::minerals::parse_other_mineral_key;
use mrt_model::transform::iso_date_to_epoch_ms;
use mrt_model::{
    active_mineral_keys, FormData, MineRow, MineralInputMode, MineralsScopeRow, ProductRow,
    ReportSnapshot, SmelterRow, TemplateType,
};
use serde_json::{json, Map, Value};

use crate::context::{
    EffectiveDateKind, LegacyRowState, LegacyRows, QuestionFieldStates, RoundtripContext,
};
use crate::document::{
    LegacyError, AMRT_REASONS_KEY, COMPANY_KEY, COMPANY_QUESTIONS_KEY, MINES_KEY, PRODUCTS_KEY,
    RANGE_QUESTIONS_KEY, SMELTERS_KEY,
};
use crate::field_state::{any_string, write_legacy_field, write_nullable_string, NullableFieldState};
use crate::plan::{normalize_mineral_label, plan, LegacyPlan};
use crate::to_internal::{array, legacy_type, normalize_answer, to_internal};

/// `Yes` -> `1`, `No` -> `0`, `Unknown` -> `Unknown`; the spelling legacy `isRecycle` uses.
fn to_legacy_yes_no_unknown(value: &str) -> String {
    let raw = value.trim();
    match raw.to_lowercase().as_str() {
        "yes" | "y" | "true" => "1".to_string(),
        "no" | "n" | "false" => "0".to_string(),
        "unknown" => "Unknown".to_string(),
        _ => raw.to_string(),
    }
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn put(obj: &mut Map<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        obj.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn has_text(obj: &Map<String, Value>, key: &str) -> bool {
    !any_string(obj.get(key)).trim().is_empty()
}

fn set_array(out: &mut Map<String, Value>, key: &str, existed: bool, items: Vec<Value>) {
    if existed || !items.is_empty() {
        out.insert(key.to_string(), Value::Array(items));
    }
}

fn is_array(out: &Map<String, Value>, key: &str) -> bool {
    matches!(out.get(key), Some(Value::Array(_)))
}

fn write_answer_fields(
    item: &mut Map<String, Value>,
    states: Option<&QuestionFieldStates>,
    answer: Option<&str>,
    remark: Option<&str>,
) {
    let states = states.copied().unwrap_or(QuestionFieldStates {
        answer: NullableFieldState::PRESENT_STRING,
        remark: NullableFieldState::PRESENT_STRING,
    });
    if let Some(written) = answer.and_then(|a| write_nullable_string(&states.answer, a)) {
        item.insert("answer".to_string(), written);
    }
    if let Some(written) = remark.and_then(|r| write_nullable_string(&states.remark, r)) {
        item.insert("remark".to_string(), written);
    }
}

trait RowId {
    fn row_id(&self) -> &str;
}

macro_rules! row_id {
    ($($row:ty),*) => {
        $(impl RowId for $row {
            fn row_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

row_id!(SmelterRow, MineRow, ProductRow, MineralsScopeRow);

/// Replaces `item[key]` with `label` unless it already names the same mineral.
fn relabel(item: &mut Map<String, Value>, key: &str, label: String) {
    if normalize_mineral_label(&any_string(item.get(key))) != normalize_mineral_label(&label) {
        item.insert(key.to_string(), Value::String(label));
    }
}

/// One existing legacy row being patched.
struct RowPatch<'r> {
    item: Map<String, Value>,
    state: &'r LegacyRowState,
}

impl RowPatch<'_> {
    fn open<'r>(original: &[Value], state: &'r LegacyRowState) -> RowPatch<'r> {
        let item = original
            .get(state.index)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        RowPatch { item, state }
    }

    fn write(&mut self, key: &str, value: &str) {
        write_legacy_field(&mut self.item, &self.state.fields, key, value);
    }

    /// Writes only when `value` differs from what the row was imported as.
    fn write_if_changed(&mut self, field: &str, key: &str, value: &str) {
        if !self.state.unchanged(field, value) {
            self.write(key, value);
        }
    }

    fn into_value(self) -> Value {
        Value::Object(self.item)
    }
}

struct Exporter<'a> {
    plan: &'a LegacyPlan,
    ctx: &'a RoundtripContext,
    data: &'a FormData,
    active: Vec<String>,
    ctx_key_by_label: BTreeMap<String, String>,
}

impl Exporter<'_> {
    /// Label the user typed for `key`: an `other-i` slot, or a free-text template's slot.
    fn custom_label(&self, key: &str) -> Option<String> {
        let scope = &self.plan.def.mineral_scope;
        let index = match scope.mode {
            MineralInputMode::FreeText => scope.keys().position(|k| k == key)?,
            _ => parse_other_mineral_key(key)?,
        };
        let label = self.data.custom_minerals.get(index)?.trim();
        (!label.is_empty()).then(|| label.to_string())
    }

    /// Label a mineral key is written as in question rows.
    fn label_for_mineral(&self, key: &str) -> String {
        self.custom_label(key)
            .or_else(|| self.ctx.mineral_label_by_key.get(key).cloned())
            .or_else(|| self.plan.preferred_label_by_key.get(key).cloned())
            .unwrap_or_else(|| key.to_string())
    }

    /// Label written for a row's `metal`, which holds a mineral key or free text.
    fn row_metal_label(&self, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        if let Some(label) = self.custom_label(value) {
            return label;
        }
        if let Some(label) = self.ctx.mineral_label_by_key.get(value) {
            return label.clone();
        }
        match self.plan.mineral_key(value) {
            Some(key) => self
                .ctx
                .mineral_label_by_key
                .get(key)
                .or_else(|| self.plan.preferred_label_by_key.get(key))
                .cloned()
                .unwrap_or_else(|| value.to_string()),
            None => value.to_string(),
        }
    }

    fn mineral_key_for_label(&self, label: &str) -> Option<String> {
        self.plan.mineral_key(label).map(str::to_string).or_else(|| {
            self.ctx_key_by_label
                .get(&normalize_mineral_label(label))
                .cloned()
        })
    }

    /// Index of the question row `{prefix}{label}` for `mineral`, falling back to any row under
    /// `prefix` whose label resolves to the same mineral.
    fn question_index(
        &self,
        index_by_key: &BTreeMap<String, usize>,
        prefix: &str,
        mineral: &str,
    ) -> Option<usize> {
        let label = self
            .ctx
            .mineral_label_by_key
            .get(mineral)
            .cloned()
            .unwrap_or_else(|| self.label_for_mineral(mineral));
        if let Some(&index) = index_by_key.get(&format!("{prefix}{label}")) {
            return Some(index);
        }
        index_by_key
            .iter()
            .filter_map(|(key, &index)| Some((key.strip_prefix(prefix)?, index)))
            .find(|(label, _)| self.mineral_key_for_label(label).as_deref() == Some(mineral))
            .map(|(_, index)| index)
    }

    /// Per-mineral rows for minerals no longer in scope are dropped; anything unrecognized stays.
    fn keeps_mineral_row(&self, label: &str) -> bool {
        match self.mineral_key_for_label(label) {
            Some(key) => self.active.contains(&key),
            None => true,
        }
    }

    fn write_metal(&self, patch: &mut RowPatch<'_>, value: &str) {
        let label = self.row_metal_label(value);
        let original = any_string(patch.item.get("metal"));
        if !patch.state.unchanged("metal", value)
            || normalize_mineral_label(&label) != normalize_mineral_label(&original)
        {
            patch.write("metal", &label);
        }
    }

    fn effective_date_for_write(&self, authorization_date: &str) -> Option<Value> {
        let state = &self.ctx.effective_date;
        if authorization_date == state.derived_authorization_date {
            return state.original_value.clone();
        }
        if authorization_date.is_empty() {
            return match state.kind {
                EffectiveDateKind::Missing => None,
                EffectiveDateKind::Null => Some(Value::Null),
                EffectiveDateKind::Number => Some(json!(0)),
                EffectiveDateKind::String | EffectiveDateKind::Other => Some(json!("")),
            };
        }
        match iso_date_to_epoch_ms(authorization_date) {
            None => state.original_value.clone(),
            Some(ms) if state.kind == EffectiveDateKind::Number => Some(json!(ms)),
            Some(ms) => Some(Value::String(ms.to_string())),
        }
    }

    fn patch_company(&self, out: &mut Map<String, Value>) {
        let existing = out.get(COMPANY_KEY).and_then(Value::as_object);
        let had_company = existing.is_some();
        let mut company = existing.cloned().unwrap_or_default();

        for &field in self.plan.def.company_info_fields {
            let legacy_key = self.plan.legacy_company_key(field);
            if legacy_key == "effectiveDate" {
                continue;
            }
            let state = self
                .ctx
                .company_field_states
                .get(legacy_key)
                .copied()
                .unwrap_or_default();
            match write_nullable_string(&state, self.data.company(field)) {
                Some(written) => {
                    company.insert(legacy_key.to_string(), written);
                }
                None => {
                    company.shift_remove(legacy_key);
                }
            }
        }

        match self.effective_date_for_write(self.data.company("authorizationDate")) {
            Some(value) => {
                company.insert("effectiveDate".to_string(), value);
            }
            None => {
                company.shift_remove("effectiveDate");
            }
        }

        if had_company || !company.is_empty() {
            out.insert(COMPANY_KEY.to_string(), Value::Object(company));
        }
    }

    fn patch_range_questions(&self, out: &mut Map<String, Value>) {
        let existed = is_array(out, RANGE_QUESTIONS_KEY);
        let mut range = array(out, RANGE_QUESTIONS_KEY).to_vec();
        let ctx = self.ctx;
        let template_type = self.plan.template_type;

        for (&number, &question_key) in &self.plan.question_key_by_type {
            let Some(def) = self.plan.def.question(question_key) else {
                continue;
            };
            let answers = self.data.questions.get(question_key);
            let comments = self.data.question_comments.get(question_key);

            if def.per_mineral {
                for mineral in &self.active {
                    let label = self.label_for_mineral(mineral);
                    let index = self.question_index(
                        &ctx.range_question_index_by_key,
                        &format!("{number}|"),
                        mineral,
                    );
                    let answer = answers.map(|a| a.for_mineral(mineral)).unwrap_or("");
                    let remark = comments.map(|a| a.for_mineral(mineral)).unwrap_or("");

                    match index.and_then(|i| range.get_mut(i)).and_then(Value::as_object_mut) {
                        Some(item) => {
                            let imported = normalize_answer(template_type, question_key, item.get("answer"));
                            let answer = (imported != answer).then_some(answer);
                            let states = index.and_then(|i| ctx.range_question_states.get(&i));
                            write_answer_fields(item, states, answer, Some(remark));
                            relabel(item, "question", label);
                        }
                        None if answer.is_empty() && remark.is_empty() => {}
                        None => range.push(json!({
                            "type": number,
                            "question": label,
                            "answer": answer,
                            "remark": remark,
                        })),
                    }
                }
                continue;
            }

            let prefix = format!("{number}|");
            let index = ctx
                .range_question_index_by_key
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(_, &index)| index)
                .min();
            let answer = answers.map(|a| a.text()).unwrap_or("");
            let remark = comments.map(|a| a.text()).unwrap_or("");

            match index.and_then(|i| range.get_mut(i)).and_then(Value::as_object_mut) {
                Some(item) => {
                    let imported = normalize_answer(template_type, question_key, item.get("answer"));
                    let answer = (imported != answer).then_some(answer);
                    let states = index.and_then(|i| ctx.range_question_states.get(&i));
                    write_answer_fields(item, states, answer, Some(remark));
                }
                None if answer.is_empty() && remark.is_empty() => {}
                None => {
                    let label = self
                        .plan
                        .def
                        .mineral_scope
                        .keys()
                        .next()
                        .map(|key| self.label_for_mineral(key))
                        .unwrap_or_default();
                    range.push(json!({
                        "type": number,
                        "question": label,
                        "answer": answer,
                        "remark": remark,
                    }));
                }
            }
        }

        range.retain(|value| {
            let Some(item) = value.as_object() else {
                return true;
            };
            let per_mineral = legacy_type(item.get("type"))
                .and_then(|number| self.plan.question_key_by_type.get(&number))
                .and_then(|key| self.plan.def.question(key))
                .is_some_and(|def| def.per_mineral);
            !per_mineral || self.keeps_mineral_row(&any_string(item.get("question")))
        });

        set_array(out, RANGE_QUESTIONS_KEY, existed, range);
    }

    fn patch_company_questions(&self, out: &mut Map<String, Value>) {
        let existed = is_array(out, COMPANY_QUESTIONS_KEY);
        let mut list = array(out, COMPANY_QUESTIONS_KEY).to_vec();
        let ctx = self.ctx;

        for def in &self.plan.def.company_questions {
            let answers = self.data.company_questions.get(def.key);
            let comments = self.data.company_questions.get(&format!("{}_comment", def.key));

            if def.per_mineral {
                for mineral in &self.active {
                    let type_label = self.label_for_mineral(mineral);
                    let index = self.question_index(
                        &ctx.company_question_index_by_key,
                        &format!("{}|", def.key),
                        mineral,
                    );
                    let answer = answers.map(|a| a.for_mineral(mineral)).unwrap_or("");
                    let remark = comments.map(|a| a.for_mineral(mineral)).unwrap_or("");

                    match index.and_then(|i| list.get_mut(i)).and_then(Value::as_object_mut) {
                        Some(item) => {
                            let states = index.and_then(|i| ctx.company_question_states.get(&i));
                            write_answer_fields(item, states, Some(answer), Some(remark));
                            relabel(item, "type", type_label);
                        }
                        None if answer.is_empty() && remark.is_empty() => {}
                        None => list.push(json!({
                            "question": def.key,
                            "type": type_label,
                            "answer": answer,
                            "remark": remark,
                        })),
                    }
                }
                continue;
            }

            let index = ctx
                .company_question_index_by_key
                .get(&format!("{}|", def.key))
                .copied();
            let answer = answers.map(|a| a.text()).unwrap_or("");
            // Questions without a comment field never touch the legacy remark.
            let remark = comments.map(|a| a.text());

            match index.and_then(|i| list.get_mut(i)).and_then(Value::as_object_mut) {
                Some(item) => {
                    let states = index.and_then(|i| ctx.company_question_states.get(&i));
                    write_answer_fields(item, states, Some(answer), remark);
                }
                None if answer.is_empty() && remark.unwrap_or("").is_empty() => {}
                None => list.push(json!({
                    "question": def.key,
                    "type": null,
                    "answer": answer,
                    "remark": remark.unwrap_or(""),
                })),
            }
        }

        list.retain(|value| {
            let Some(item) = value.as_object() else {
                return true;
            };
            let per_mineral = item
                .get("question")
                .and_then(Value::as_str)
                .and_then(|key| self.plan.def.company_question(key))
                .is_some_and(|def| def.per_mineral);
            !per_mineral || self.keeps_mineral_row(&any_string(item.get("type")))
        });

        set_array(out, COMPANY_QUESTIONS_KEY, existed, list);
    }

    fn patch_smelter(&self, original: &[Value], state: &LegacyRowState, row: &SmelterRow) -> Value {
        let mut patch = RowPatch::open(original, state);
        let has_standard_name = has_text(&patch.item, "standardSmelterName");
        let has_number = has_text(&patch.item, "smelterNumber");
        let has_legacy_id = has_text(&patch.item, "smelterId");

        self.write_metal(&mut patch, &row.metal);
        patch.write_if_changed("smelterLookup", "smelterLookUp", &row.smelter_lookup);

        if !state.unchanged("smelterName", &row.smelter_name) {
            let was_null = state.fields.get("smelterName").is_some_and(|s| s.was_null);
            let fallback = self
                .ctx
                .smelter_name_fallback_by_index
                .get(&state.index)
                .filter(|name| !name.is_empty());
            if has_standard_name {
                patch.write("standardSmelterName", &row.smelter_name);
            } else if was_null && fallback == Some(&row.smelter_name) {
                patch.item.insert("smelterName".to_string(), Value::Null);
            } else {
                patch.write("smelterName", &row.smelter_name);
            }
        }
        patch.write_if_changed("smelterCountry", "smelterCountry", &row.smelter_country);

        let id_changed = !state.unchanged("smelterId", opt(&row.smelter_id));
        let identification_changed =
            !state.unchanged("smelterIdentification", opt(&row.smelter_identification));
        if id_changed || identification_changed {
            let next = if id_changed {
                opt(&row.smelter_id)
            } else {
                opt(&row.smelter_identification)
            };
            let target = if !has_number && has_legacy_id {
                "smelterId"
            } else {
                "smelterNumber"
            };
            patch.write(target, next);
        }
        patch.write_if_changed("sourceId", "smelterIdentification", opt(&row.source_id));

        patch.write("smelterStreet", opt(&row.smelter_street));
        patch.write("smelterCity", opt(&row.smelter_city));
        patch.write("smelterProvince", opt(&row.smelter_state));
        patch.write("smelterContact", opt(&row.smelter_contact_name));
        patch.write("smelterEmail", opt(&row.smelter_contact_email));
        patch.write("suggest", opt(&row.proposed_next_steps));
        patch.write("mineName", opt(&row.mine_name));
        patch.write("mineCountry", opt(&row.mine_country));
        if !state.unchanged("recycledScrap", opt(&row.recycled_scrap)) {
            patch.write("isRecycle", &to_legacy_yes_no_unknown(opt(&row.recycled_scrap)));
        }
        patch.write("remark", opt(&row.comments));
        patch.into_value()
    }

    fn new_smelter(&self, row: &SmelterRow) -> Value {
        let mut created = Map::new();
        created.insert("id".to_string(), Value::String(row.id.clone()));
        put(&mut created, "metal", &self.row_metal_label(&row.metal));
        put(&mut created, "smelterLookUp", &row.smelter_lookup);
        put(&mut created, "smelterName", &row.smelter_name);
        if !row.smelter_lookup.is_empty() {
            put(&mut created, "standardSmelterName", &row.smelter_name);
        }
        put(&mut created, "smelterCountry", &row.smelter_country);
        let number = [opt(&row.smelter_identification), opt(&row.smelter_id)]
            .into_iter()
            .find(|v| !v.is_empty())
            .unwrap_or("");
        put(&mut created, "smelterNumber", number);
        put(&mut created, "smelterIdentification", opt(&row.source_id));
        put(&mut created, "smelterStreet", opt(&row.smelter_street));
        put(&mut created, "smelterCity", opt(&row.smelter_city));
        put(&mut created, "smelterProvince", opt(&row.smelter_state));
        put(&mut created, "smelterContact", opt(&row.smelter_contact_name));
        put(&mut created, "smelterEmail", opt(&row.smelter_contact_email));
        put(&mut created, "suggest", opt(&row.proposed_next_steps));
        put(&mut created, "mineName", opt(&row.mine_name));
        put(&mut created, "mineCountry", opt(&row.mine_country));
        put(&mut created, "isRecycle", &to_legacy_yes_no_unknown(opt(&row.recycled_scrap)));
        put(&mut created, "remark", opt(&row.comments));
        Value::Object(created)
    }

    fn patch_mine(&self, original: &[Value], state: &LegacyRowState, row: &MineRow) -> Value {
        let mut patch = RowPatch::open(original, state);
        self.write_metal(&mut patch, &row.metal);
        patch.write("smelterName", &row.smelter_name);
        patch.write("mineFacilityName", &row.mine_name);
        patch.write("mineFacilityCountry", &row.mine_country);
        patch.write("mineFacilityStreet", opt(&row.mine_street));
        patch.write("mineFacilityCity", opt(&row.mine_city));
        patch.write("mineFacilityProvince", &row.mine_province);
        patch.write("mineIdentificationNumber", opt(&row.mine_id));
        patch.write("mineIdentification", opt(&row.mine_id_source));
        patch.write("mineFacilityContact", opt(&row.mine_contact_name));
        patch.write("mineFacilityEmail", opt(&row.mine_contact_email));
        patch.write("proposedNextSteps", opt(&row.proposed_next_steps));
        patch.write("comments", &row.comments);
        patch.into_value()
    }

    fn new_mine(&self, row: &MineRow) -> Value {
        let mut created = Map::new();
        put(&mut created, "metal", &self.row_metal_label(&row.metal));
        put(&mut created, "smelterName", &row.smelter_name);
        put(&mut created, "mineFacilityName", &row.mine_name);
        put(&mut created, "mineIdentificationNumber", opt(&row.mine_id));
        put(&mut created, "mineIdentification", opt(&row.mine_id_source));
        put(&mut created, "mineFacilityCountry", &row.mine_country);
        put(&mut created, "mineFacilityStreet", opt(&row.mine_street));
        put(&mut created, "mineFacilityCity", opt(&row.mine_city));
        put(&mut created, "mineFacilityProvince", &row.mine_province);
        put(&mut created, "mineFacilityContact", opt(&row.mine_contact_name));
        put(&mut created, "mineFacilityEmail", opt(&row.mine_contact_email));
        put(&mut created, "proposedNextSteps", opt(&row.proposed_next_steps));
        put(&mut created, "comments", &row.comments);
        Value::Object(created)
    }

    fn patch_product(&self, original: &[Value], state: &LegacyRowState, row: &ProductRow) -> Value {
        let mut patch = RowPatch::open(original, state);
        let keys = self
            .ctx
            .product_keys_by_index
            .get(&state.index)
            .cloned()
            .unwrap_or_default();
        patch.write_if_changed("productNumber", &keys.product_number, &row.product_number);
        patch.write_if_changed("productName", &keys.product_name, &row.product_name);
        patch.write_if_changed("requesterNumber", &keys.requester_number, opt(&row.requester_number));
        patch.write_if_changed("requesterName", &keys.requester_name, opt(&row.requester_name));
        patch.write_if_changed("comments", &keys.comments, &row.comments);
        patch.into_value()
    }

    fn new_product(&self, row: &ProductRow) -> Value {
        let keys = self
            .ctx
            .product_keys_by_index
            .values()
            .next()
            .cloned()
            .unwrap_or_default();
        let mut created = Map::new();
        created.insert("id".to_string(), Value::String(row.id.clone()));
        put(&mut created, &keys.product_number, &row.product_number);
        put(&mut created, &keys.product_name, &row.product_name);
        put(&mut created, &keys.requester_number, opt(&row.requester_number));
        put(&mut created, &keys.requester_name, opt(&row.requester_name));
        put(&mut created, &keys.comments, &row.comments);
        Value::Object(created)
    }

    fn patch_amrt_reason(&self, original: &[Value], state: &LegacyRowState, row: &MineralsScopeRow) -> Value {
        let mut patch = RowPatch::open(original, state);
        self.write_metal(&mut patch, &row.mineral);
        patch.write("reason", &row.reason);
        patch.into_value()
    }

    fn new_amrt_reason(&self, row: &MineralsScopeRow) -> Value {
        let mut created = Map::new();
        created.insert("id".to_string(), Value::String(row.id.clone()));
        put(&mut created, "metal", &self.row_metal_label(&row.mineral));
        put(&mut created, "reason", &row.reason);
        Value::Object(created)
    }

    /// Rebuilds the legacy array at `key` in snapshot row order: known rows are patched copies
    /// of their originals, new rows are built from scratch, deleted rows disappear.
    fn patch_rows<R: RowId>(
        &self,
        out: &mut Map<String, Value>,
        key: &str,
        known: &LegacyRows,
        rows: &[R],
        patch: impl Fn(&[Value], &LegacyRowState, &R) -> Value,
        create: impl Fn(&R) -> Value,
    ) {
        let existed = is_array(out, key);
        let original = array(&self.ctx.original, key);
        let next = rows
            .iter()
            .map(|row| match known.by_id.get(row.row_id()) {
                Some(state) => patch(original, state, row),
                None => create(row),
            })
            .collect();
        set_array(out, key, existed, next);
    }
}

/// Writes `snapshot` back into the legacy document `ctx` was imported from.
///
/// Fields whose value did not change keep their original JSON shape (absent, `null`, `""`,
/// number); keys the adapter does not model are carried through unchanged.
pub fn to_external(snapshot: &ReportSnapshot, ctx: &RoundtripContext) -> Result<Value, LegacyError> {
    if snapshot.template_type != ctx.template_type || snapshot.version_id != ctx.version_id {
        return Err(LegacyError::ContextMismatch {
            snapshot: format!("{}@{}", snapshot.template_type, snapshot.version_id),
            context: format!("{}@{}", ctx.template_type, ctx.version_id),
        });
    }

    let plan = plan(ctx.template_type, &ctx.version_id)?;
    let data = &snapshot.data;
    let exporter = Exporter {
        plan: &plan,
        ctx,
        data,
        active: active_mineral_keys(plan.def, &data.selected_minerals, &data.custom_minerals),
        ctx_key_by_label: ctx.mineral_key_by_label(),
    };

    let mut out = ctx.original.clone();
    exporter.patch_company(&mut out);
    exporter.patch_range_questions(&mut out);
    exporter.patch_company_questions(&mut out);
    exporter.patch_rows(
        &mut out,
        SMELTERS_KEY,
        &ctx.smelters,
        &data.smelter_list,
        |original, state, row| exporter.patch_smelter(original, state, row),
        |row| exporter.new_smelter(row),
    );
    exporter.patch_rows(
        &mut out,
        MINES_KEY,
        &ctx.mines,
        &data.mine_list,
        |original, state, row| exporter.patch_mine(original, state, row),
        |row| exporter.new_mine(row),
    );
    exporter.patch_rows(
        &mut out,
        PRODUCTS_KEY,
        &ctx.products,
        &data.product_list,
        |original, state, row| exporter.patch_product(original, state, row),
        |row| exporter.new_product(row),
    );
    exporter.patch_rows(
        &mut out,
        AMRT_REASONS_KEY,
        &ctx.amrt_reasons,
        &data.minerals_scope,
        |original, state, row| exporter.patch_amrt_reason(original, state, row),
        |row| exporter.new_amrt_reason(row),
    );

    log::debug!("exported {}@{} to legacy JSON", ctx.template_type, ctx.version_id);
    Ok(Value::Object(out))
}

fn questionnaire_type(template_type: TemplateType) -> Option<u8> {
    match template_type {
        TemplateType::Cmrt => Some(1),
        TemplateType::Emrt => Some(2),
        TemplateType::Amrt => Some(3),
        TemplateType::Crt => None,
    }
}

/// Minimal legacy document for `template_type@version_id` with every list present and empty.
fn skeleton(template_type: TemplateType, version_id: &str) -> Value {
    let marker = format!("RMI_{}_{version_id}", template_type.as_upper());
    let mut doc = match questionnaire_type(template_type) {
        None => json!({ "type": template_type.as_str(), "version": marker }),
        Some(questionnaire) => json!({ "name": marker, "questionnaireType": questionnaire }),
    };
    if let Value::Object(obj) = &mut doc {
        obj.insert(COMPANY_KEY.to_string(), json!({}));
        for key in [
            RANGE_QUESTIONS_KEY,
            COMPANY_QUESTIONS_KEY,
            SMELTERS_KEY,
            MINES_KEY,
            PRODUCTS_KEY,
        ] {
            obj.insert(key.to_string(), json!([]));
        }
        if template_type == TemplateType::Amrt {
            obj.insert(AMRT_REASONS_KEY.to_string(), json!([]));
        }
    }
    doc
}

/// Exports a snapshot that was not imported from a legacy document.
pub fn to_external_loose(snapshot: &ReportSnapshot) -> Result<Value, LegacyError> {
    let (_, ctx) = to_internal(&skeleton(snapshot.template_type, &snapshot.version_id))?;
    to_external(snapshot, &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn recycled_flags_are_written_back_in_legacy_spelling() {
        assert_eq!(to_legacy_yes_no_unknown("Yes"), "1");
        assert_eq!(to_legacy_yes_no_unknown(" no "), "0");
        assert_eq!(to_legacy_yes_no_unknown("Unknown"), "Unknown");
        assert_eq!(to_legacy_yes_no_unknown("partly"), "partly");
        assert_eq!(to_legacy_yes_no_unknown(""), "");
    }

    #[test]
    fn skeletons_identify_their_template() {
        assert_eq!(
            skeleton(TemplateType::Crt, "2.21"),
            json!({
                "type": "crt",
                "version": "RMI_CRT_2.21",
                "cmtCompany": {},
                "cmtRangeQuestions": [],
                "cmtCompanyQuestions": [],
                "cmtSmelters": [],
                "minList": [],
                "cmtParts": []
            })
        );
        let amrt = skeleton(TemplateType::Amrt, "1.3");
        assert_eq!(amrt["name"], "RMI_AMRT_1.3");
        assert_eq!(amrt["questionnaireType"], 3);
        assert_eq!(amrt["amrtReasonList"], json!([]));
        assert!(skeleton(TemplateType::Emrt, "2.1").get("amrtReasonList").is_none());
    }

    #[test]
    fn snapshots_must_match_their_context() {
        let (_, ctx) = to_internal(&skeleton(TemplateType::Cmrt, "6.5")).unwrap();
        let other = ReportSnapshot::new(TemplateType::Cmrt, "6.4", FormData::default());
        let err = to_external(&other, &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "snapshot cmrt@6.4 does not match roundtrip context cmrt@6.5"
        );
    }
}
