//! Row anchors of each template's Declaration sheet.
//!
//! The rows where question and company-question blocks start differ between template
//! versions. They are extracted offline from the blank templates (see [`crate::scan`]) and
//! shipped as `data/anchors.json`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use mrt_model::TemplateType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUNDLED_ANCHORS_JSON: &str = include_str!("../data/anchors.json");

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("invalid anchor map: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bundled anchor map is invalid: {0}")]
    Bundled(String),
}

/// Anchor rows of one template version's Declaration sheet. Rows are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationAnchors {
    #[serde(default)]
    pub question_header_row_by_number: BTreeMap<u32, u32>,
    #[serde(default)]
    pub question_span_by_number: BTreeMap<u32, u32>,
    #[serde(default)]
    pub company_header_row_by_key: BTreeMap<String, u32>,
    #[serde(default)]
    pub company_span_by_key: BTreeMap<String, u32>,
    #[serde(default)]
    pub amrt_q1_row: Option<u32>,
    #[serde(default)]
    pub amrt_q2_row: Option<u32>,
    #[serde(default)]
    pub amrt_q3_row: Option<u32>,
}

impl DeclarationAnchors {
    pub fn question_row(&self, number: u32) -> Option<u32> {
        self.question_header_row_by_number.get(&number).copied()
    }

    /// Rows available below question `number`'s header; 0 when unknown.
    pub fn question_span(&self, number: u32) -> u32 {
        self.question_span_by_number
            .get(&number)
            .copied()
            .unwrap_or(0)
    }

    pub fn company_row(&self, key: &str) -> Option<u32> {
        self.company_header_row_by_key.get(key).copied()
    }

    pub fn company_span(&self, key: &str) -> u32 {
        self.company_span_by_key.get(key).copied().unwrap_or(0)
    }
}

/// `type -> version -> anchors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorMap {
    entries: BTreeMap<TemplateType, BTreeMap<String, DeclarationAnchors>>,
}

impl AnchorMap {
    pub fn from_json(json: &str) -> Result<Self, AnchorError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty JSON with a trailing newline, the form checked into `data/anchors.json`.
    pub fn to_json_pretty(&self) -> Result<String, AnchorError> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    pub fn get(&self, template_type: TemplateType, version: &str) -> Option<&DeclarationAnchors> {
        self.entries.get(&template_type)?.get(version)
    }

    pub fn insert(&mut self, template_type: TemplateType, version: &str, anchors: DeclarationAnchors) {
        self.entries
            .entry(template_type)
            .or_default()
            .insert(version.to_string(), anchors);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The anchor map compiled into this crate, parsed on first use.
pub fn bundled_anchor_map() -> Result<&'static AnchorMap, AnchorError> {
    static BUNDLED: OnceLock<Result<AnchorMap, String>> = OnceLock::new();
    BUNDLED
        .get_or_init(|| AnchorMap::from_json(BUNDLED_ANCHORS_JSON).map_err(|err| err.to_string()))
        .as_ref()
        .map_err(|msg| AnchorError::Bundled(msg.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn bundled_map_covers_every_registered_version() {
        let map = bundled_anchor_map().unwrap();
        for template_type in TemplateType::ALL {
            for version in template_type.versions() {
                let anchors = map
                    .get(template_type, version)
                    .unwrap_or_else(|| panic!("no anchors for {template_type}@{version}"));
                let def = mrt_model::version_def(template_type, version).unwrap();
                if template_type == TemplateType::Amrt {
                    assert!(anchors.amrt_q1_row.is_some());
                    assert!(anchors.amrt_q2_row.is_some());
                    continue;
                }
                for q in &def.questions {
                    let n: u32 = q.key[1..].parse().unwrap();
                    assert!(anchors.question_row(n).is_some(), "{template_type}@{version} {}", q.key);
                }
                for q in &def.company_questions {
                    assert!(anchors.company_row(q.key).is_some(), "{template_type}@{version} {}", q.key);
                }
            }
        }
    }

    #[test]
    fn json_round_trips_with_numeric_keys() {
        let mut anchors = DeclarationAnchors::default();
        anchors.question_header_row_by_number.insert(10, 80);
        anchors.question_header_row_by_number.insert(2, 30);
        anchors.question_span_by_number.insert(2, 4);
        anchors.company_header_row_by_key.insert("A".to_string(), 66);

        let mut map = AnchorMap::default();
        map.insert(TemplateType::Crt, "2.21", anchors.clone());

        let json = map.to_json_pretty().unwrap();
        assert!(json.contains("\"crt\""));
        assert!(json.contains("\"questionHeaderRowByNumber\""));
        assert!(json.ends_with('\n'));

        let parsed = AnchorMap::from_json(&json).unwrap();
        assert_eq!(parsed.get(TemplateType::Crt, "2.21"), Some(&anchors));
        assert_eq!(parsed.len(), 1);
    }
}
