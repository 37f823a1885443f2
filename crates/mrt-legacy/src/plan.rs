//! Per template version lookup tables, built once and shared.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use mrt_model::{version_def, TemplateType, TemplateVersionDef};
use regex::Regex;

use crate::document::LegacyError;

/// Lookup tables for converting one template version.
#[derive(Debug)]
pub struct LegacyPlan {
    pub template_type: TemplateType,
    pub version_id: String,
    pub def: &'static TemplateVersionDef,
    /// Legacy range question `type` number -> question key (`1` -> `Q1`).
    pub question_key_by_type: BTreeMap<i64, &'static str>,
    /// Normalized mineral label -> mineral key.
    pub mineral_key_by_label: HashMap<String, &'static str>,
    /// Mineral key -> label written for new legacy rows.
    pub preferred_label_by_key: BTreeMap<&'static str, String>,
    /// Company information key -> legacy `cmtCompany` field.
    pub legacy_company_key_by_internal_key: BTreeMap<&'static str, &'static str>,
}

impl LegacyPlan {
    pub fn mineral_key(&self, label: &str) -> Option<&'static str> {
        self.mineral_key_by_label
            .get(&normalize_mineral_label(label))
            .copied()
    }

    pub fn legacy_company_key<'a>(&self, internal: &'a str) -> &'a str {
        self.legacy_company_key_by_internal_key
            .get(internal)
            .copied()
            .unwrap_or(internal)
    }
}

const LEGACY_COMPANY_KEYS: [(&str, &str); 14] = [
    ("companyName", "companyName"),
    ("declarationScope", "species"),
    ("scopeDescription", "rangeDescription"),
    ("companyId", "identify"),
    ("companyAuthId", "authorization"),
    ("address", "address"),
    ("contactName", "contactName"),
    ("contactEmail", "contactEmail"),
    ("contactPhone", "contactPhone"),
    ("authorizerName", "authorizerName"),
    ("authorizerTitle", "authorizerJobTitle"),
    ("authorizerEmail", "authorizerEmail"),
    ("authorizerPhone", "authorizerPhone"),
    ("authorizationDate", "effectiveDate"),
];

const MINERAL_LABEL_OVERRIDES: [(&str, &str); 2] = [
    ("rareEarthElements", "Rare Earth Elements"),
    ("sodaAsh", "Soda Ash"),
];

fn camel_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"))
}

fn question_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Q(\d+)$").expect("valid regex"))
}

/// Lowercase ASCII letters and digits only; the form mineral labels are compared in.
pub fn normalize_mineral_label(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn split_camel(value: &str) -> String {
    let spaced = camel_boundary().replace_all(value, "$1 $2");
    spaced.replace(['_', '-'], " ").trim().to_string()
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn build(template_type: TemplateType, version_id: &str) -> Result<LegacyPlan, LegacyError> {
    let def = version_def(template_type, version_id).map_err(|source| {
        LegacyError::UnsupportedTemplate {
            template_type,
            version: version_id.to_string(),
            source,
        }
    })?;

    let question_key_by_type = def
        .questions
        .iter()
        .filter_map(|q| {
            let caps = question_key_re().captures(q.key)?;
            Some((caps[1].parse::<i64>().ok()?, q.key))
        })
        .collect();

    let mut mineral_key_by_label = HashMap::new();
    let mut preferred_label_by_key = BTreeMap::new();
    for key in def.mineral_scope.keys() {
        let spaced = split_camel(key);
        let preferred = MINERAL_LABEL_OVERRIDES
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| title_case(&spaced));

        for candidate in [key.to_string(), title_case(&spaced), spaced, preferred.clone()] {
            let norm = normalize_mineral_label(&candidate);
            if !norm.is_empty() {
                mineral_key_by_label.insert(norm, key);
            }
        }
        preferred_label_by_key.insert(key, preferred);
    }

    Ok(LegacyPlan {
        template_type,
        version_id: version_id.to_string(),
        def,
        question_key_by_type,
        mineral_key_by_label,
        preferred_label_by_key,
        legacy_company_key_by_internal_key: LEGACY_COMPANY_KEYS.into_iter().collect(),
    })
}

type PlanCache = RwLock<HashMap<String, Arc<LegacyPlan>>>;

fn cache() -> &'static PlanCache {
    static PLANS: OnceLock<PlanCache> = OnceLock::new();
    PLANS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// The shared plan for `template_type@version_id`, built on first use.
pub fn plan(template_type: TemplateType, version_id: &str) -> Result<Arc<LegacyPlan>, LegacyError> {
    let key = format!("{template_type}@{version_id}");
    if let Ok(plans) = cache().read() {
        if let Some(plan) = plans.get(&key) {
            return Ok(Arc::clone(plan));
        }
    }

    let built = Arc::new(build(template_type, version_id)?);
    match cache().write() {
        Ok(mut plans) => Ok(Arc::clone(plans.entry(key).or_insert(built))),
        // A poisoned cache only costs a rebuild.
        Err(_) => Ok(built),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn labels_normalize_to_letters_and_digits() {
        assert_eq!(normalize_mineral_label("  Rare-Earth Elements "), "rareearthelements");
        assert_eq!(split_camel("rareEarthElements"), "rare Earth Elements");
        assert_eq!(title_case("rare Earth elements"), "Rare Earth Elements");
    }

    #[test]
    fn amrt_plan_maps_labels_to_keys() {
        let plan = plan(TemplateType::Amrt, "1.3").unwrap();
        assert_eq!(plan.mineral_key("Soda Ash"), Some("sodaAsh"));
        assert_eq!(plan.mineral_key("RARE EARTH ELEMENTS"), Some("rareEarthElements"));
        assert_eq!(plan.mineral_key("Aluminium"), None);
        assert_eq!(plan.preferred_label_by_key["sodaAsh"], "Soda Ash");
        assert_eq!(plan.preferred_label_by_key["platinum"], "Platinum");
        assert_eq!(plan.question_key_by_type.get(&2).copied(), Some("Q2"));
    }

    #[test]
    fn company_keys_map_to_legacy_names() {
        let plan = plan(TemplateType::Cmrt, "6.5").unwrap();
        assert_eq!(plan.legacy_company_key("declarationScope"), "species");
        assert_eq!(plan.legacy_company_key("authorizationDate"), "effectiveDate");
        assert_eq!(plan.legacy_company_key("vendorCode"), "vendorCode");
        assert_eq!(plan.question_key_by_type.len(), 8);
    }

    #[test]
    fn plans_are_cached_per_version() {
        let a = plan(TemplateType::Emrt, "2.1").unwrap();
        let b = plan(TemplateType::Emrt, "2.1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(matches!(
            plan(TemplateType::Emrt, "0.1"),
            Err(LegacyError::UnsupportedTemplate { .. })
        ));
    }
}
