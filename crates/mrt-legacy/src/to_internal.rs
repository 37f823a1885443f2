//! Legacy document -> [`ReportSnapshot`] plus the [`RoundtripContext`] needed to write it back.

use std::collections::BTreeMap;

use mrt_model::minerals::other_mineral_key;
use mrt_model::registry::MineralInputMode;
use mrt_model::transform::{
    iso_date_to_epoch_ms, normalize_authorization_date_number, normalize_authorization_date_text,
};
use mrt_model::{
    AnswerValue, FormData, MineRow, MineralsScopeRow, ProductRow, ReportSnapshot, SmelterRow,
    TemplateType,
};
use serde_json::{Map, Value};

use crate::context::{
    EffectiveDateKind, EffectiveDateState, LegacyRowState, LegacyRows, ProductKeys,
    QuestionFieldStates, RoundtripContext,
};
use crate::document::{
    parse_legacy_report, LegacyError, AMRT_REASONS_KEY, COMPANY_KEY, COMPANY_QUESTIONS_KEY,
    MINES_KEY, PRODUCTS_KEY, RANGE_QUESTIONS_KEY, SMELTERS_KEY,
};
use crate::field_state::{any_string, capture_states, nullable_string, FieldStates, NullableFieldState};
use crate::plan::{normalize_mineral_label, plan, LegacyPlan};

pub(crate) fn array<'a>(doc: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    doc.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Integral value of a range question `type`.
pub(crate) fn legacy_type(value: Option<&Value>) -> Option<i64> {
    let Value::Number(number) = value? else {
        return None;
    };
    number.as_i64().or_else(|| {
        number
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Answer text a range question is imported as. CRT question 4 spells "all of it" as `100%`.
pub(crate) fn normalize_answer(template_type: TemplateType, question_key: &str, value: Option<&Value>) -> String {
    let Some(text) = value.and_then(Value::as_str) else {
        return String::new();
    };
    let trimmed = text.trim();
    if template_type == TemplateType::Crt && question_key == "Q4" {
        if let Some(number) = trimmed.strip_suffix('%') {
            if number.trim_end() == "100" {
                return "1".to_string();
            }
        }
    }
    trimmed.to_string()
}

/// `1`/`yes`/`y`/`true` -> `Yes`, `0`/`no`/`n`/`false` -> `No`, `unknown`/`unk` -> `Unknown`.
pub(crate) fn normalize_yes_no_unknown(value: Option<&Value>) -> String {
    let raw = any_string(value);
    let raw = raw.trim();
    match raw.to_lowercase().as_str() {
        "1" | "yes" | "y" | "true" => "Yes".to_string(),
        "0" | "no" | "n" | "false" => "No".to_string(),
        "unknown" | "unk" => "Unknown".to_string(),
        _ => raw.to_string(),
    }
}

/// `YYYY-MM-DD` for a legacy `effectiveDate`, or empty when it does not read as a date.
pub(crate) fn derive_authorization_date(value: Option<&Value>) -> String {
    let normalized = match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if let Some(prefix) = trimmed.get(..10).filter(|p| iso_date_to_epoch_ms(p).is_some()) {
                return prefix.to_string();
            }
            normalize_authorization_date_text(trimmed)
        }
        Some(Value::Number(number)) => number
            .as_f64()
            .map(normalize_authorization_date_number)
            .unwrap_or_default(),
        _ => return String::new(),
    };
    if iso_date_to_epoch_ms(&normalized).is_some() {
        normalized
    } else {
        String::new()
    }
}

fn optional(item: &Map<String, Value>, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates.iter().copied().find(|c| !c.is_empty()).unwrap_or("")
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Internal row id: the legacy `id` when usable and not taken, else `fallback`.
fn row_id(rows: &LegacyRows, raw: Option<&Value>, fallback: String) -> String {
    let id = match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return fallback,
    };
    if rows.contains(&id) {
        log::warn!("duplicate legacy row id {id:?}; importing it as {fallback:?}");
        fallback
    } else {
        id
    }
}

pub(crate) fn smelter_values(row: &SmelterRow) -> BTreeMap<&'static str, String> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    BTreeMap::from([
        ("metal", row.metal.clone()),
        ("smelterLookup", row.smelter_lookup.clone()),
        ("smelterName", row.smelter_name.clone()),
        ("smelterCountry", row.smelter_country.clone()),
        ("smelterId", opt(&row.smelter_id)),
        ("smelterIdentification", opt(&row.smelter_identification)),
        ("sourceId", opt(&row.source_id)),
        ("recycledScrap", opt(&row.recycled_scrap)),
    ])
}

pub(crate) fn product_values(row: &ProductRow) -> BTreeMap<&'static str, String> {
    BTreeMap::from([
        ("productNumber", row.product_number.clone()),
        ("productName", row.product_name.clone()),
        ("requesterNumber", row.requester_number.clone().unwrap_or_default()),
        ("requesterName", row.requester_name.clone().unwrap_or_default()),
        ("comments", row.comments.clone()),
    ])
}

struct Importer<'a> {
    plan: &'a LegacyPlan,
    doc: &'a Map<String, Value>,
    data: FormData,
    /// Mineral key -> label seen in the document.
    label_by_key: BTreeMap<String, String>,
    /// Normalized label -> key for labels that are not template minerals (custom slots).
    key_by_label: BTreeMap<String, String>,
}

impl<'a> Importer<'a> {
    fn remember_label(&mut self, key: &str, label: &str) {
        self.label_by_key.insert(key.to_string(), label.to_string());
        let norm = normalize_mineral_label(label);
        if !norm.is_empty() {
            self.key_by_label.insert(norm, key.to_string());
        }
    }

    fn lookup_mineral(&self, label: &str) -> Option<String> {
        let norm = normalize_mineral_label(label);
        if norm.is_empty() {
            return None;
        }
        self.plan
            .mineral_key_by_label
            .get(&norm)
            .map(|key| key.to_string())
            .or_else(|| self.key_by_label.get(&norm).cloned())
    }

    /// Mineral key for a row's `metal`, or the label itself when it names no known mineral.
    fn resolve_mineral(&mut self, raw: Option<&Value>) -> String {
        let label = any_string(raw);
        if label.is_empty() {
            return label;
        }
        match self.lookup_mineral(&label) {
            Some(key) => {
                self.label_by_key.entry(key.clone()).or_insert(label);
                key
            }
            None => label,
        }
    }

    fn read_company(&mut self) -> (FieldStates, EffectiveDateState) {
        let company = self.doc.get(COMPANY_KEY).and_then(Value::as_object);

        let mut states = FieldStates::new();
        for &legacy_key in self.plan.legacy_company_key_by_internal_key.values() {
            if legacy_key != "effectiveDate" {
                states.insert(legacy_key.to_string(), NullableFieldState::read(company, legacy_key));
            }
        }

        let raw = company.and_then(|c| c.get("effectiveDate"));
        let kind = match raw {
            None => EffectiveDateKind::Missing,
            Some(Value::Null) => EffectiveDateKind::Null,
            Some(Value::String(_)) => EffectiveDateKind::String,
            Some(Value::Number(_)) => EffectiveDateKind::Number,
            Some(_) => EffectiveDateKind::Other,
        };
        let derived = derive_authorization_date(raw);

        for &field in self.plan.def.company_info_fields {
            let legacy_key = self.plan.legacy_company_key(field);
            let value = if legacy_key == "effectiveDate" {
                derived.clone()
            } else {
                nullable_string(company.and_then(|c| c.get(legacy_key)))
            };
            self.data.company_info.insert(field.to_string(), value);
        }

        let effective_date = EffectiveDateState {
            kind,
            original_value: raw.cloned(),
            derived_authorization_date: derived,
        };
        (states, effective_date)
    }

    /// Mineral selection for templates whose minerals are not fixed, taken from the labels of
    /// the type-1 range questions.
    fn read_mineral_scope(&mut self) {
        let plan = self.plan;
        let scope = &plan.def.mineral_scope;
        let labels: Vec<String> = array(self.doc, RANGE_QUESTIONS_KEY)
            .iter()
            .filter_map(Value::as_object)
            .filter(|item| legacy_type(item.get("type")) == Some(1))
            .filter_map(|item| item.get("question").and_then(Value::as_str))
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect();

        match scope.mode {
            MineralInputMode::Fixed => {}
            MineralInputMode::DynamicDropdown => {
                let max_other = if scope.contains("other") {
                    scope.other_slot_count.unwrap_or(0)
                } else {
                    0
                };
                let mut selected = Vec::new();
                let mut custom = Vec::new();
                for label in labels {
                    if let Some(key) = plan.mineral_key(&label) {
                        push_unique(&mut selected, key);
                        self.remember_label(key, &label);
                    } else if custom.len() < max_other {
                        custom.push(label);
                    } else {
                        log::warn!("no free custom mineral slot for {label:?}; dropping it");
                    }
                }
                if !custom.is_empty() {
                    push_unique(&mut selected, "other");
                    for (index, label) in custom.iter().enumerate() {
                        self.remember_label(&other_mineral_key(index), label);
                    }
                    self.data.custom_minerals = custom;
                }
                if !selected.is_empty() {
                    self.data.selected_minerals = selected;
                }
            }
            MineralInputMode::FreeText => {
                if labels.is_empty() {
                    return;
                }
                let max = scope.max_count.unwrap_or(labels.len());
                let custom: Vec<String> = labels.into_iter().take(max).collect();
                let keys: Vec<&'static str> = scope.keys().collect();
                for (key, label) in keys.into_iter().zip(&custom) {
                    self.remember_label(key, label);
                }
                self.data.custom_minerals = custom;
            }
        }
    }

    fn read_range_questions(&mut self) -> (BTreeMap<String, usize>, BTreeMap<usize, QuestionFieldStates>) {
        let mut index_by_key = BTreeMap::new();
        let mut states = BTreeMap::new();
        let plan = self.plan;

        for (index, value) in array(self.doc, RANGE_QUESTIONS_KEY).iter().enumerate() {
            let Some(item) = value.as_object() else {
                continue;
            };
            let Some(number) = legacy_type(item.get("type")) else {
                continue;
            };
            let Some(&question_key) = plan.question_key_by_type.get(&number) else {
                continue;
            };
            let Some(def) = plan.def.question(question_key) else {
                continue;
            };

            let question = nullable_string(item.get("question"));
            index_by_key.insert(format!("{number}|{question}"), index);
            states.insert(
                index,
                QuestionFieldStates {
                    answer: NullableFieldState::read(Some(item), "answer"),
                    remark: NullableFieldState::read(Some(item), "remark"),
                },
            );

            let answer = normalize_answer(plan.template_type, question_key, item.get("answer"));
            let remark = nullable_string(item.get("remark"));
            if def.per_mineral {
                let Some(mineral) = self.lookup_mineral(&question) else {
                    continue;
                };
                self.label_by_key.entry(mineral.clone()).or_insert(question);
                self.data
                    .questions
                    .entry(question_key.to_string())
                    .or_default()
                    .per_mineral_mut()
                    .insert(mineral.clone(), answer);
                self.data
                    .question_comments
                    .entry(question_key.to_string())
                    .or_default()
                    .per_mineral_mut()
                    .insert(mineral, remark);
            } else {
                self.data
                    .questions
                    .insert(question_key.to_string(), AnswerValue::Text(answer));
                self.data
                    .question_comments
                    .insert(question_key.to_string(), AnswerValue::Text(remark));
            }
        }
        (index_by_key, states)
    }

    fn read_company_questions(&mut self) -> (BTreeMap<String, usize>, BTreeMap<usize, QuestionFieldStates>) {
        let mut index_by_key = BTreeMap::new();
        let mut states = BTreeMap::new();
        let plan = self.plan;

        for (index, value) in array(self.doc, COMPANY_QUESTIONS_KEY).iter().enumerate() {
            let Some(item) = value.as_object() else {
                continue;
            };
            let question = nullable_string(item.get("question"));
            let type_label = nullable_string(item.get("type"));
            index_by_key.insert(format!("{question}|{type_label}"), index);
            states.insert(
                index,
                QuestionFieldStates {
                    answer: NullableFieldState::read(Some(item), "answer"),
                    remark: NullableFieldState::read(Some(item), "remark"),
                },
            );

            let Some(def) = plan.def.company_question(&question) else {
                continue;
            };
            let answer = nullable_string(item.get("answer"));
            let remark = nullable_string(item.get("remark"));
            let comment_key = format!("{question}_comment");
            if def.per_mineral {
                let Some(mineral) = self.lookup_mineral(&type_label) else {
                    continue;
                };
                self.label_by_key.insert(mineral.clone(), type_label);
                self.data
                    .company_questions
                    .entry(question)
                    .or_default()
                    .per_mineral_mut()
                    .insert(mineral.clone(), answer);
                self.data
                    .company_questions
                    .entry(comment_key)
                    .or_default()
                    .per_mineral_mut()
                    .insert(mineral, remark);
            } else {
                self.data
                    .company_questions
                    .insert(question, AnswerValue::Text(answer));
                if let Some(slot) = self.data.company_questions.get_mut(&comment_key) {
                    *slot = AnswerValue::Text(remark);
                }
            }
        }
        (index_by_key, states)
    }

    fn read_smelters(&mut self) -> (LegacyRows, BTreeMap<usize, String>) {
        let mut rows = LegacyRows::default();
        let mut name_fallbacks = BTreeMap::new();
        let mut list = Vec::new();

        for (index, value) in array(self.doc, SMELTERS_KEY).iter().enumerate() {
            let Some(item) = value.as_object() else {
                continue;
            };
            let id = row_id(&rows, item.get("id"), format!("smelter-{index}"));
            let text = |key: &str| nullable_string(item.get(key));

            let lookup = text("smelterLookUp");
            let name = text("smelterName");
            let standard_name = text("standardSmelterName");
            if matches!(item.get("smelterName"), Some(Value::Null)) {
                name_fallbacks.insert(index, standard_name.clone());
            }
            let number = text("smelterNumber");
            let legacy_id = text("smelterId");
            let smelter_id = first_non_empty(&[&number, &legacy_id]).to_string();

            let row = SmelterRow {
                id: id.clone(),
                metal: self.resolve_mineral(item.get("metal")),
                smelter_lookup: first_non_empty(&[&lookup, &name, &standard_name]).to_string(),
                smelter_name: first_non_empty(&[&standard_name, &name]).to_string(),
                smelter_country: text("smelterCountry"),
                smelter_id: non_empty(smelter_id.clone()),
                smelter_identification: non_empty(smelter_id),
                source_id: non_empty(text("smelterIdentification")),
                smelter_street: optional(item, "smelterStreet"),
                smelter_city: optional(item, "smelterCity"),
                smelter_state: optional(item, "smelterProvince"),
                smelter_contact_name: optional(item, "smelterContact"),
                smelter_contact_email: optional(item, "smelterEmail"),
                proposed_next_steps: optional(item, "suggest"),
                mine_name: optional(item, "mineName"),
                mine_country: optional(item, "mineCountry"),
                recycled_scrap: non_empty(normalize_yes_no_unknown(item.get("isRecycle"))),
                comments: optional(item, "remark"),
                ..SmelterRow::default()
            };

            rows.insert(
                id,
                LegacyRowState {
                    index,
                    fields: capture_states(
                        item,
                        &["smelterName", "smelterLookUp", "smelterCountry", "smelterId", "remark"],
                    ),
                    derived: smelter_values(&row),
                },
            );
            list.push(row);
        }

        self.data.smelter_list = list;
        (rows, name_fallbacks)
    }

    fn read_mines(&mut self) -> LegacyRows {
        let mut rows = LegacyRows::default();
        let mut list = Vec::new();

        for (index, value) in array(self.doc, MINES_KEY).iter().enumerate() {
            let Some(item) = value.as_object() else {
                continue;
            };
            let id = format!("mine-{index}");
            let text = |key: &str| nullable_string(item.get(key));
            let row = MineRow {
                id: id.clone(),
                metal: self.resolve_mineral(item.get("metal")),
                smelter_name: text("smelterName"),
                mine_name: text("mineFacilityName"),
                mine_country: text("mineFacilityCountry"),
                mine_id: optional(item, "mineIdentificationNumber"),
                mine_id_source: optional(item, "mineIdentification"),
                mine_street: optional(item, "mineFacilityStreet"),
                mine_city: optional(item, "mineFacilityCity"),
                mine_province: text("mineFacilityProvince"),
                mine_district: String::new(),
                mine_contact_name: optional(item, "mineFacilityContact"),
                mine_contact_email: optional(item, "mineFacilityEmail"),
                proposed_next_steps: optional(item, "proposedNextSteps"),
                comments: text("comments"),
                ..MineRow::default()
            };
            rows.insert(
                id,
                LegacyRowState {
                    index,
                    fields: capture_states(item, &["mineFacilityName", "mineFacilityCountry", "comments"]),
                    derived: BTreeMap::from([("metal", row.metal.clone())]),
                },
            );
            list.push(row);
        }

        self.data.mine_list = list;
        rows
    }

    fn read_products(&mut self) -> (LegacyRows, BTreeMap<usize, ProductKeys>) {
        let mut rows = LegacyRows::default();
        let mut keys_by_index = BTreeMap::new();
        let mut list = Vec::new();

        for (index, value) in array(self.doc, PRODUCTS_KEY).iter().enumerate() {
            let Some(item) = value.as_object() else {
                continue;
            };
            let raw_id = item
                .get("id")
                .filter(|v| !v.is_null())
                .or_else(|| item.get("partId"));
            let id = row_id(&rows, raw_id, format!("product-{index}"));
            let keys = ProductKeys::pick(item);
            let value_of = |key: &str| any_string(item.get(key));

            let row = ProductRow {
                id: id.clone(),
                product_number: value_of(&keys.product_number),
                product_name: value_of(&keys.product_name),
                requester_number: non_empty(value_of(&keys.requester_number)),
                requester_name: non_empty(value_of(&keys.requester_name)),
                comments: value_of(&keys.comments),
                ..ProductRow::default()
            };

            let aliases: Vec<&str> = ProductKeys::ALIASES
                .iter()
                .flat_map(|&(primary, alias)| [primary, alias])
                .collect();
            rows.insert(
                id,
                LegacyRowState {
                    index,
                    fields: capture_states(item, &aliases),
                    derived: product_values(&row),
                },
            );
            keys_by_index.insert(index, keys);
            list.push(row);
        }

        self.data.product_list = list;
        (rows, keys_by_index)
    }

    fn read_amrt_reasons(&mut self) -> LegacyRows {
        let mut rows = LegacyRows::default();
        let mut list = Vec::new();

        for (index, value) in array(self.doc, AMRT_REASONS_KEY).iter().enumerate() {
            let Some(item) = value.as_object() else {
                continue;
            };
            let id = row_id(&rows, item.get("id"), format!("minerals-scope-{index}"));
            let row = MineralsScopeRow {
                id: id.clone(),
                mineral: self.resolve_mineral(item.get("metal")),
                reason: nullable_string(item.get("reason")),
            };
            rows.insert(
                id,
                LegacyRowState {
                    index,
                    fields: capture_states(item, &["metal", "reason"]),
                    derived: BTreeMap::from([("metal", row.mineral.clone())]),
                },
            );
            list.push(row);
        }

        self.data.minerals_scope = list;
        rows
    }
}

/// Reads a legacy document into a snapshot and the context [`crate::to_external`] needs to
/// write the snapshot back without disturbing anything it does not model.
pub fn to_internal(input: &Value) -> Result<(ReportSnapshot, RoundtripContext), LegacyError> {
    let parsed = parse_legacy_report(input)?;
    let plan = plan(parsed.template_type, &parsed.version_id)?;

    let mut importer = Importer {
        plan: &plan,
        doc: &parsed.document,
        data: FormData::empty_for(plan.def),
        label_by_key: BTreeMap::new(),
        key_by_label: BTreeMap::new(),
    };

    let (company_field_states, effective_date) = importer.read_company();
    importer.read_mineral_scope();
    let (range_question_index_by_key, range_question_states) = importer.read_range_questions();
    let (company_question_index_by_key, company_question_states) = importer.read_company_questions();
    let (smelters, smelter_name_fallback_by_index) = importer.read_smelters();
    let mines = importer.read_mines();
    let (products, product_keys_by_index) = importer.read_products();
    let amrt_reasons = importer.read_amrt_reasons();

    let Importer {
        data, label_by_key, ..
    } = importer;

    log::debug!(
        "imported legacy {}@{}: {} smelters, {} mines, {} products",
        parsed.template_type,
        parsed.version_id,
        data.smelter_list.len(),
        data.mine_list.len(),
        data.product_list.len()
    );

    let snapshot = ReportSnapshot::new(parsed.template_type, parsed.version_id.clone(), data);
    let ctx = RoundtripContext {
        template_type: parsed.template_type,
        version_id: parsed.version_id,
        original: parsed.document,
        company_field_states,
        effective_date,
        range_question_index_by_key,
        range_question_states,
        company_question_index_by_key,
        company_question_states,
        mineral_label_by_key: label_by_key,
        smelters,
        smelter_name_fallback_by_index,
        mines,
        products,
        product_keys_by_index,
        amrt_reasons,
    };
    Ok((snapshot, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn authorization_dates_are_read_as_utc_days() {
        assert_eq!(derive_authorization_date(Some(&json!(1_709_596_800_000i64))), "2024-03-05");
        assert_eq!(derive_authorization_date(Some(&json!("1709596800"))), "2024-03-05");
        assert_eq!(derive_authorization_date(Some(&json!("2024-03-05T08:00:00Z"))), "2024-03-05");
        assert_eq!(derive_authorization_date(Some(&json!("next week"))), "");
        assert_eq!(derive_authorization_date(Some(&json!(42))), "");
        assert_eq!(derive_authorization_date(Some(&Value::Null)), "");
        assert_eq!(derive_authorization_date(None), "");
    }

    #[test]
    fn recycled_flags_are_normalized() {
        assert_eq!(normalize_yes_no_unknown(Some(&json!("1"))), "Yes");
        assert_eq!(normalize_yes_no_unknown(Some(&json!(" y "))), "Yes");
        assert_eq!(normalize_yes_no_unknown(Some(&json!("FALSE"))), "No");
        assert_eq!(normalize_yes_no_unknown(Some(&json!("unk"))), "Unknown");
        assert_eq!(normalize_yes_no_unknown(Some(&json!("partly"))), "partly");
        assert_eq!(normalize_yes_no_unknown(Some(&Value::Null)), "");
    }

    #[test]
    fn crt_full_share_answer_reads_as_one() {
        assert_eq!(normalize_answer(TemplateType::Crt, "Q4", Some(&json!(" 100 % "))), "1");
        assert_eq!(normalize_answer(TemplateType::Crt, "Q3", Some(&json!("100%"))), "100%");
        assert_eq!(normalize_answer(TemplateType::Cmrt, "Q4", Some(&json!("100%"))), "100%");
        assert_eq!(normalize_answer(TemplateType::Crt, "Q4", None), "");
    }

    #[test]
    fn company_fields_use_legacy_names() {
        let (snapshot, ctx) = to_internal(&json!({
            "name": "RMI_CMRT_6.5",
            "cmtCompany": {
                "companyName": "Acme",
                "species": "A",
                "authorizerJobTitle": null,
                "effectiveDate": 1_709_596_800_000i64
            }
        }))
        .unwrap();

        let info = &snapshot.data.company_info;
        assert_eq!(info["companyName"], "Acme");
        assert_eq!(info["declarationScope"], "A");
        assert_eq!(info["authorizerTitle"], "");
        assert_eq!(info["authorizationDate"], "2024-03-05");
        assert!(ctx.company_field_states["authorizerJobTitle"].was_null);
        assert!(!ctx.company_field_states["contactName"].exists);
        assert_eq!(ctx.effective_date.kind, EffectiveDateKind::Number);
    }

    #[test]
    fn dropdown_minerals_come_from_type_one_questions() {
        let (snapshot, ctx) = to_internal(&json!({
            "name": "RMI_AMRT_1.3",
            "cmtRangeQuestions": [
                { "type": 1, "question": "Soda Ash", "answer": "Yes", "remark": null },
                { "type": 1, "question": "Gallium", "answer": "No", "remark": "" },
                { "type": 2, "question": "Gallium", "answer": "Unknown", "remark": "" }
            ]
        }))
        .unwrap();

        let data = &snapshot.data;
        assert_eq!(data.selected_minerals, vec!["sodaAsh", "other"]);
        assert_eq!(data.custom_minerals, vec!["Gallium"]);
        assert_eq!(data.questions["Q1"].for_mineral("sodaAsh"), "Yes");
        assert_eq!(data.questions["Q1"].for_mineral("other-0"), "No");
        assert_eq!(data.questions["Q2"].for_mineral("other-0"), "Unknown");
        assert_eq!(ctx.mineral_label_by_key["other-0"], "Gallium");
        assert_eq!(ctx.range_question_index_by_key["2|Gallium"], 2);
    }

    #[test]
    fn free_text_minerals_fill_slots_in_order() {
        let (snapshot, ctx) = to_internal(&json!({
            "name": "RMI_AMRT_1.1",
            "cmtRangeQuestions": [
                { "type": 1, "question": "Aluminium", "answer": "Yes" },
                { "type": 1, "question": "Cobalt", "answer": "No" }
            ]
        }))
        .unwrap();

        assert_eq!(snapshot.data.custom_minerals, vec!["Aluminium", "Cobalt"]);
        assert_eq!(snapshot.data.questions["Q1"].for_mineral("aluminum"), "Yes");
        assert_eq!(snapshot.data.questions["Q1"].for_mineral("copper"), "No");
        assert_eq!(ctx.mineral_label_by_key["copper"], "Cobalt");
    }

    #[test]
    fn smelter_rows_pick_the_best_name_and_id() {
        let (snapshot, ctx) = to_internal(&json!({
            "name": "RMI_CMRT_6.5",
            "cmtSmelters": [
                {
                    "metal": "tin",
                    "smelterName": null,
                    "standardSmelterName": "Standard Tin",
                    "smelterId": "CID001",
                    "isRecycle": "0"
                },
                { "id": 7, "metal": "Gold", "smelterLookUp": "Smelter not listed", "smelterName": "Own" }
            ]
        }))
        .unwrap();

        let rows = &snapshot.data.smelter_list;
        assert_eq!(rows[0].id, "smelter-0");
        assert_eq!(rows[0].metal, "tin");
        assert_eq!(rows[0].smelter_lookup, "Standard Tin");
        assert_eq!(rows[0].smelter_name, "Standard Tin");
        assert_eq!(rows[0].smelter_id.as_deref(), Some("CID001"));
        assert_eq!(rows[0].recycled_scrap.as_deref(), Some("No"));
        assert_eq!(rows[1].id, "7");
        assert_eq!(rows[1].metal, "gold");
        assert_eq!(rows[1].smelter_lookup, "Smelter not listed");
        assert_eq!(ctx.smelter_name_fallback_by_index[&0], "Standard Tin");
        assert_eq!(ctx.smelters.index_of("7"), Some(1));
    }

    #[test]
    fn duplicate_row_ids_fall_back_to_positional_ids() {
        let (snapshot, ctx) = to_internal(&json!({
            "name": "RMI_CRT_2.21",
            "cmtParts": [
                { "id": "p", "partNumber": 100, "partName": "Bolt" },
                { "id": "p", "productNumber": "200" }
            ]
        }))
        .unwrap();

        let rows = &snapshot.data.product_list;
        assert_eq!(rows[0].id, "p");
        assert_eq!(rows[0].product_number, "100");
        assert_eq!(rows[0].product_name, "Bolt");
        assert_eq!(rows[1].id, "product-1");
        assert_eq!(ctx.product_keys_by_index[&0].product_number, "partNumber");
        assert_eq!(ctx.products.index_of("product-1"), Some(1));
    }
}
