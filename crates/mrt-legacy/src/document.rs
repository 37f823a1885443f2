//! Validation of legacy questionnaire documents and template inference.
//!
//! Only the fields the adapter reads are type-checked; every other key is carried through
//! untouched.

use std::sync::OnceLock;

use mrt_model::{version_def, RegistryError, TemplateType};
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("invalid legacy report at {path}: expected {expected}")]
    Schema { path: String, expected: &'static str },
    #[error("cannot infer templateType/versionId from legacy report")]
    CannotInferTemplate,
    #[error("legacy report templateType mismatch: type says {tag}, name/version says {inferred}")]
    TemplateMismatch {
        tag: TemplateType,
        inferred: TemplateType,
    },
    #[error("unsupported template/version: {template_type}@{version}")]
    UnsupportedTemplate {
        template_type: TemplateType,
        version: String,
        #[source]
        source: RegistryError,
    },
    #[error("snapshot {snapshot} does not match roundtrip context {context}")]
    ContextMismatch { snapshot: String, context: String },
}

/// A legacy document that passed validation, with the template it was written for.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedLegacyReport {
    pub document: Map<String, Value>,
    pub template_type: TemplateType,
    pub version_id: String,
}

pub(crate) const COMPANY_KEY: &str = "cmtCompany";
pub(crate) const RANGE_QUESTIONS_KEY: &str = "cmtRangeQuestions";
pub(crate) const COMPANY_QUESTIONS_KEY: &str = "cmtCompanyQuestions";
pub(crate) const SMELTERS_KEY: &str = "cmtSmelters";
pub(crate) const MINES_KEY: &str = "minList";
pub(crate) const PRODUCTS_KEY: &str = "cmtParts";
pub(crate) const AMRT_REASONS_KEY: &str = "amrtReasonList";

const COMPANY_STRING_FIELDS: [&str; 13] = [
    "companyName",
    "species",
    "rangeDescription",
    "identify",
    "authorization",
    "address",
    "contactName",
    "contactEmail",
    "contactPhone",
    "authorizerName",
    "authorizerJobTitle",
    "authorizerEmail",
    "authorizerPhone",
];

const SMELTER_STRING_FIELDS: [&str; 19] = [
    "metal",
    "smelterLookUp",
    "standardSmelterName",
    "smelterNumber",
    "smelterName",
    "smelterCountry",
    "smelterProvince",
    "smelterCity",
    "smelterStreet",
    "smelterIdentification",
    "smelterContact",
    "smelterEmail",
    "suggest",
    "mineName",
    "mineCountry",
    "isRecycle",
    "remark",
    "smelterId",
    "sourceId",
];

const MINE_STRING_FIELDS: [&str; 14] = [
    "smelterId",
    "metal",
    "smelterName",
    "mineFacilityName",
    "mineIdentification",
    "mineIdentificationNumber",
    "mineFacilityCountry",
    "mineFacilityStreet",
    "mineFacilityCity",
    "mineFacilityProvince",
    "mineFacilityContact",
    "mineFacilityEmail",
    "proposedNextSteps",
    "comments",
];

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)RMI_(CMRT|EMRT|CRT|AMRT)_([0-9.]+)").expect("valid regex"))
}

fn schema(path: impl Into<String>, expected: &'static str) -> LegacyError {
    LegacyError::Schema {
        path: path.into(),
        expected,
    }
}

/// Walks one level of the document, building error paths like `cmtSmelters[2].smelterName`.
struct Checker<'a> {
    path: String,
    obj: &'a Map<String, Value>,
}

impl<'a> Checker<'a> {
    fn at(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn optional_string(&self, key: &str) -> Result<(), LegacyError> {
        match self.obj.get(key) {
            None | Some(Value::String(_)) => Ok(()),
            Some(_) => Err(schema(self.at(key), "string")),
        }
    }

    fn optional_number(&self, key: &str) -> Result<(), LegacyError> {
        match self.obj.get(key) {
            None | Some(Value::Number(_)) => Ok(()),
            Some(_) => Err(schema(self.at(key), "number")),
        }
    }

    fn nullable_string(&self, key: &str) -> Result<(), LegacyError> {
        match self.obj.get(key) {
            None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
            Some(_) => Err(schema(self.at(key), "string or null")),
        }
    }

    fn nullable_strings(&self, keys: &[&str]) -> Result<(), LegacyError> {
        keys.iter().try_for_each(|key| self.nullable_string(key))
    }

    fn required_string(&self, key: &str) -> Result<(), LegacyError> {
        match self.obj.get(key) {
            Some(Value::String(_)) => Ok(()),
            _ => Err(schema(self.at(key), "string")),
        }
    }

    fn id(&self, key: &str) -> Result<(), LegacyError> {
        match self.obj.get(key) {
            None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Number(_)) => Ok(()),
            Some(_) => Err(schema(self.at(key), "string or number")),
        }
    }

    /// Checks every element of the array at `key` (absent or `null` is accepted).
    fn each<F>(&self, key: &str, check: F) -> Result<(), LegacyError>
    where
        F: Fn(&Checker<'_>) -> Result<(), LegacyError>,
    {
        let items = match self.obj.get(key) {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(schema(self.at(key), "array")),
        };
        for (index, item) in items.iter().enumerate() {
            let path = format!("{}[{index}]", self.at(key));
            let Value::Object(obj) = item else {
                return Err(schema(path, "object"));
            };
            check(&Checker { path, obj })?;
        }
        Ok(())
    }
}

fn validate(root: &Map<String, Value>) -> Result<(), LegacyError> {
    let doc = Checker {
        path: String::new(),
        obj: root,
    };
    doc.optional_string("name")?;
    doc.optional_string("type")?;
    doc.optional_string("version")?;
    doc.optional_number("questionnaireType")?;

    match root.get(COMPANY_KEY) {
        None | Some(Value::Null) => {}
        Some(Value::Object(obj)) => {
            let company = Checker {
                path: COMPANY_KEY.to_string(),
                obj,
            };
            company.nullable_strings(&COMPANY_STRING_FIELDS)?;
            match obj.get("effectiveDate") {
                None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Number(_)) => {}
                Some(_) => {
                    return Err(schema(company.at("effectiveDate"), "string, number or null"))
                }
            }
        }
        Some(_) => return Err(schema(COMPANY_KEY, "object")),
    }

    doc.each(RANGE_QUESTIONS_KEY, |item| {
        match item.obj.get("type") {
            Some(Value::Number(_)) => {}
            _ => return Err(schema(item.at("type"), "number")),
        }
        item.required_string("question")?;
        item.nullable_strings(&["answer", "remark"])
    })?;
    doc.each(COMPANY_QUESTIONS_KEY, |item| {
        item.required_string("question")?;
        item.nullable_strings(&["answer", "remark", "type"])
    })?;
    doc.each(SMELTERS_KEY, |item| {
        item.id("id")?;
        item.nullable_strings(&SMELTER_STRING_FIELDS)
    })?;
    doc.each(MINES_KEY, |item| item.nullable_strings(&MINE_STRING_FIELDS))?;
    doc.each(PRODUCTS_KEY, |item| {
        item.id("id")?;
        item.id("partId")
    })?;
    doc.each(AMRT_REASONS_KEY, |item| {
        item.id("id")?;
        item.nullable_strings(&["metal", "reason"])
    })
}

fn from_name_or_version(value: &str) -> Option<(TemplateType, String)> {
    let caps = version_re().captures(value)?;
    let template_type = caps[1].parse().ok()?;
    Some((template_type, caps[2].to_string()))
}

/// Validates `input` and works out which template and version it was filled for.
///
/// The `type` tag names the template; `name` (then `version`) must carry an
/// `RMI_<TYPE>_<version>` marker for the version.
pub fn parse_legacy_report(input: &Value) -> Result<ParsedLegacyReport, LegacyError> {
    let Value::Object(root) = input else {
        return Err(schema("$", "object"));
    };
    validate(root)?;

    let text = |key: &str| root.get(key).and_then(Value::as_str);
    let from_type = text("type").and_then(|t| t.parse::<TemplateType>().ok());
    let inferred = text("name")
        .and_then(from_name_or_version)
        .or_else(|| text("version").and_then(from_name_or_version));

    let Some((inferred_type, version_id)) = inferred else {
        return Err(LegacyError::CannotInferTemplate);
    };
    let template_type = match from_type {
        Some(tag) if tag != inferred_type => {
            return Err(LegacyError::TemplateMismatch {
                tag,
                inferred: inferred_type,
            })
        }
        Some(tag) => tag,
        None => inferred_type,
    };

    version_def(template_type, &version_id).map_err(|source| LegacyError::UnsupportedTemplate {
        template_type,
        version: version_id.clone(),
        source,
    })?;

    Ok(ParsedLegacyReport {
        document: root.clone(),
        template_type,
        version_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn infers_template_from_name_then_version() {
        let parsed = parse_legacy_report(&json!({ "name": "rmi_cmrt_6.5", "questionnaireType": 1 }))
            .unwrap();
        assert_eq!(parsed.template_type, TemplateType::Cmrt);
        assert_eq!(parsed.version_id, "6.5");

        let parsed = parse_legacy_report(&json!({ "type": "CRT", "version": "RMI_CRT_2.21" })).unwrap();
        assert_eq!(parsed.template_type, TemplateType::Crt);
        assert_eq!(parsed.version_id, "2.21");
    }

    #[test]
    fn a_type_tag_alone_is_not_enough() {
        assert!(matches!(
            parse_legacy_report(&json!({ "type": "crt" })),
            Err(LegacyError::CannotInferTemplate)
        ));
    }

    #[test]
    fn type_tag_must_agree_with_the_name() {
        let err = parse_legacy_report(&json!({ "type": "emrt", "name": "RMI_CMRT_6.5" })).unwrap_err();
        assert!(matches!(
            err,
            LegacyError::TemplateMismatch {
                tag: TemplateType::Emrt,
                inferred: TemplateType::Cmrt
            }
        ));
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let err = parse_legacy_report(&json!({ "name": "RMI_EMRT_9.9" })).unwrap_err();
        assert_eq!(err.to_string(), "unsupported template/version: emrt@9.9");
    }

    #[test]
    fn schema_errors_name_the_offending_path() {
        let err = parse_legacy_report(&json!({
            "name": "RMI_CMRT_6.5",
            "cmtSmelters": [{ "id": 1 }, { "id": "s2", "smelterName": 12 }]
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid legacy report at cmtSmelters[1].smelterName: expected string or null"
        );

        let err = parse_legacy_report(&json!({
            "name": "RMI_CMRT_6.5",
            "cmtRangeQuestions": [{ "type": "1", "question": "Tin" }]
        }))
        .unwrap_err();
        assert!(matches!(err, LegacyError::Schema { path, .. } if path == "cmtRangeQuestions[0].type"));

        assert!(matches!(
            parse_legacy_report(&json!([])),
            Err(LegacyError::Schema { expected: "object", .. })
        ));
    }

    #[test]
    fn unknown_keys_pass_validation() {
        let input = json!({
            "name": "RMI_AMRT_1.3",
            "extraTopLevel": { "nested": [1, 2, 3] },
            "cmtCompany": { "companyName": null, "effectiveDate": 1700000000000i64, "vendorCode": 7 }
        });
        let parsed = parse_legacy_report(&input).unwrap();
        assert_eq!(Value::Object(parsed.document), input);
    }
}
