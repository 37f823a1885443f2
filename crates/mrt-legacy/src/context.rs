use std::collections::BTreeMap;

use mrt_model::TemplateType;
use serde_json::{Map, Value};

use crate::field_state::{FieldStates, NullableFieldState};

/// What [`crate::to_internal`] saw in the legacy document, so [`crate::to_external`] can patch
/// the original instead of rebuilding it.
#[derive(Clone, Debug)]
pub struct RoundtripContext {
    pub template_type: TemplateType,
    pub version_id: String,
    pub original: Map<String, Value>,
    /// States of the mapped `cmtCompany` fields, keyed by legacy field name.
    pub company_field_states: FieldStates,
    pub effective_date: EffectiveDateState,
    /// `"{type}|{question}"` -> index in `cmtRangeQuestions`.
    pub range_question_index_by_key: BTreeMap<String, usize>,
    pub range_question_states: BTreeMap<usize, QuestionFieldStates>,
    /// `"{question}|{type}"` -> index in `cmtCompanyQuestions`.
    pub company_question_index_by_key: BTreeMap<String, usize>,
    pub company_question_states: BTreeMap<usize, QuestionFieldStates>,
    /// Mineral key -> the label the legacy document used for it.
    pub mineral_label_by_key: BTreeMap<String, String>,
    pub smelters: LegacyRows,
    /// Smelter rows whose `smelterName` was `null` and whose name came from
    /// `standardSmelterName` instead.
    pub smelter_name_fallback_by_index: BTreeMap<usize, String>,
    pub mines: LegacyRows,
    pub products: LegacyRows,
    pub product_keys_by_index: BTreeMap<usize, ProductKeys>,
    pub amrt_reasons: LegacyRows,
}

impl RoundtripContext {
    /// Inverse of [`RoundtripContext::mineral_label_by_key`]; the first key wins for a label.
    pub(crate) fn mineral_key_by_label(&self) -> BTreeMap<String, String> {
        let mut by_label = BTreeMap::new();
        for (key, label) in &self.mineral_label_by_key {
            let norm = crate::plan::normalize_mineral_label(label);
            if !norm.is_empty() {
                by_label.entry(norm).or_insert_with(|| key.clone());
            }
        }
        by_label
    }
}

/// JSON kind of `cmtCompany.effectiveDate` in the original document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectiveDateKind {
    Missing,
    Null,
    String,
    Number,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveDateState {
    pub kind: EffectiveDateKind,
    pub original_value: Option<Value>,
    /// `YYYY-MM-DD` the original value was read as; empty when it could not be read.
    pub derived_authorization_date: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuestionFieldStates {
    pub answer: NullableFieldState,
    pub remark: NullableFieldState,
}

/// One legacy array row and the internal values derived from it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyRowState {
    pub index: usize,
    pub fields: FieldStates,
    /// Internal field name -> value produced on import. A row value equal to this is left
    /// alone on export.
    pub derived: BTreeMap<&'static str, String>,
}

impl LegacyRowState {
    pub(crate) fn unchanged(&self, field: &str, value: &str) -> bool {
        self.derived.get(field).is_some_and(|derived| derived == value)
    }
}

/// Rows of one legacy array, keyed by the internal row id they were imported as.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyRows {
    pub by_id: BTreeMap<String, LegacyRowState>,
}

impl LegacyRows {
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).map(|row| row.index)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub(crate) fn insert(&mut self, id: String, row: LegacyRowState) {
        self.by_id.insert(id, row);
    }
}

/// Legacy field names one `cmtParts` row uses; older exports spell them `partNumber` etc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductKeys {
    pub product_number: String,
    pub product_name: String,
    pub requester_number: String,
    pub requester_name: String,
    pub comments: String,
}

impl Default for ProductKeys {
    fn default() -> Self {
        Self {
            product_number: "productNumber".to_string(),
            product_name: "productName".to_string(),
            requester_number: "requesterNumber".to_string(),
            requester_name: "requesterName".to_string(),
            comments: "comments".to_string(),
        }
    }
}

impl ProductKeys {
    pub(crate) const ALIASES: [(&'static str, &'static str); 5] = [
        ("productNumber", "partNumber"),
        ("productName", "partName"),
        ("requesterNumber", "requestPartNumber"),
        ("requesterName", "requestPartName"),
        ("comments", "remark"),
    ];

    /// Picks, per field, the first spelling present on `obj` (the primary one otherwise).
    pub(crate) fn pick(obj: &Map<String, Value>) -> Self {
        let pick = |index: usize| {
            let (primary, alias) = Self::ALIASES[index];
            if !obj.contains_key(primary) && obj.contains_key(alias) {
                alias.to_string()
            } else {
                primary.to_string()
            }
        };
        Self {
            product_number: pick(0),
            product_name: pick(1),
            requester_number: pick(2),
            requester_name: pick(3),
            comments: pick(4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn product_keys_prefer_the_spelling_in_use() {
        let Value::Object(obj) = json!({ "partNumber": 12, "productName": "x", "remark": null }) else {
            unreachable!()
        };
        let keys = ProductKeys::pick(&obj);
        assert_eq!(keys.product_number, "partNumber");
        assert_eq!(keys.product_name, "productName");
        assert_eq!(keys.requester_name, "requesterName");
        assert_eq!(keys.comments, "remark");
    }
}
