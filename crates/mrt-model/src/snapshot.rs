use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::{MineralInputMode, TemplateType, TemplateVersionDef};
use crate::transform::humanize_key;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Serialized state of one report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    pub schema_version: u32,
    pub template_type: TemplateType,
    pub version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub data: FormData,
}

impl ReportSnapshot {
    pub fn new(template_type: TemplateType, version_id: impl Into<String>, data: FormData) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            template_type,
            version_id: version_id.into(),
            locale: None,
            data,
        }
    }
}

/// A question answer: either one value for the whole declaration or one value per mineral key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    PerMineral(BTreeMap<String, String>),
}

impl Default for AnswerValue {
    fn default() -> Self {
        AnswerValue::Text(String::new())
    }
}

impl AnswerValue {
    /// The flat answer; empty for per-mineral answers.
    pub fn text(&self) -> &str {
        match self {
            AnswerValue::Text(s) => s,
            AnswerValue::PerMineral(_) => "",
        }
    }

    /// The answer for `mineral`; empty when missing or when the answer is flat.
    pub fn for_mineral(&self, mineral: &str) -> &str {
        match self {
            AnswerValue::Text(_) => "",
            AnswerValue::PerMineral(map) => map.get(mineral).map(String::as_str).unwrap_or(""),
        }
    }

    /// Mutable access to the per-mineral table, converting a flat answer if needed.
    pub fn per_mineral_mut(&mut self) -> &mut BTreeMap<String, String> {
        if let AnswerValue::Text(_) = self {
            *self = AnswerValue::PerMineral(BTreeMap::new());
        }
        match self {
            AnswerValue::PerMineral(map) => map,
            AnswerValue::Text(_) => unreachable!("converted above"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub company_info: BTreeMap<String, String>,
    pub selected_minerals: Vec<String>,
    pub custom_minerals: Vec<String>,
    pub questions: BTreeMap<String, AnswerValue>,
    pub question_comments: BTreeMap<String, AnswerValue>,
    pub company_questions: BTreeMap<String, AnswerValue>,
    #[serde(default)]
    pub minerals_scope: Vec<MineralsScopeRow>,
    #[serde(default)]
    pub smelter_list: Vec<SmelterRow>,
    #[serde(default)]
    pub mine_list: Vec<MineRow>,
    #[serde(default)]
    pub product_list: Vec<ProductRow>,
}

impl FormData {
    /// Blank form data shaped for `def`: every company field, question and company question key
    /// is present, per-mineral entries are keyed by every declared mineral.
    pub fn empty_for(def: &TemplateVersionDef) -> Self {
        let per_mineral = || -> BTreeMap<String, String> {
            def.mineral_scope
                .keys()
                .map(|k| (k.to_string(), String::new()))
                .collect()
        };

        let mut data = FormData {
            company_info: def
                .company_info_fields
                .iter()
                .map(|k| (k.to_string(), String::new()))
                .collect(),
            ..FormData::default()
        };

        for q in &def.questions {
            let value = if q.per_mineral {
                AnswerValue::PerMineral(per_mineral())
            } else {
                AnswerValue::default()
            };
            data.questions.insert(q.key.to_string(), value.clone());
            data.question_comments.insert(q.key.to_string(), value);
        }

        for q in &def.company_questions {
            let value = if q.per_mineral {
                AnswerValue::PerMineral(per_mineral())
            } else {
                AnswerValue::default()
            };
            if q.has_comment_field {
                data.company_questions
                    .insert(format!("{}_comment", q.key), value.clone());
            }
            data.company_questions.insert(q.key.to_string(), value);
        }

        match def.mineral_scope.mode {
            MineralInputMode::Fixed => {
                data.selected_minerals = def.mineral_scope.keys().map(str::to_string).collect();
            }
            MineralInputMode::FreeText => {
                data.custom_minerals = if def.mineral_scope.default_custom_minerals.is_empty() {
                    def.mineral_scope.keys().map(humanize_key).collect()
                } else {
                    def.mineral_scope
                        .default_custom_minerals
                        .iter()
                        .map(|s| s.to_string())
                        .collect()
                };
            }
            MineralInputMode::DynamicDropdown => {}
        }

        data
    }

    pub fn company(&self, key: &str) -> &str {
        self.company_info.get(key).map(String::as_str).unwrap_or("")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmelterRow {
    pub id: String,
    pub metal: String,
    pub smelter_lookup: String,
    pub smelter_name: String,
    pub smelter_country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_metal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_smelter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smelter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smelter_identification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smelter_street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smelter_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smelter_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smelter_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smelter_contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_next_steps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycled_scrap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Fields the UI layer attached that this model does not know about.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MineRow {
    pub id: String,
    pub metal: String,
    pub smelter_name: String,
    pub mine_name: String,
    pub mine_country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_id_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_city: Option<String>,
    pub mine_province: String,
    pub mine_district: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_next_steps: Option<String>,
    pub comments: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRow {
    pub id: String,
    pub product_number: String,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    pub comments: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MineralsScopeRow {
    pub id: String,
    pub mineral: String,
    pub reason: String,
}
