//! Structural definitions of every supported template type and version.
//!
//! Definitions are plain data built once per process and shared read-only; callers get
//! `&'static` references back from [`version_def`].

use core::fmt;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Cmrt,
    Emrt,
    Crt,
    Amrt,
}

impl TemplateType {
    pub const ALL: [TemplateType; 4] = [
        TemplateType::Cmrt,
        TemplateType::Emrt,
        TemplateType::Crt,
        TemplateType::Amrt,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TemplateType::Cmrt => "cmrt",
            TemplateType::Emrt => "emrt",
            TemplateType::Crt => "crt",
            TemplateType::Amrt => "amrt",
        }
    }

    /// Upper-case family name used in template file names (`RMI_CMRT_6.5.xlsx`).
    pub const fn as_upper(self) -> &'static str {
        match self {
            TemplateType::Cmrt => "CMRT",
            TemplateType::Emrt => "EMRT",
            TemplateType::Crt => "CRT",
            TemplateType::Amrt => "AMRT",
        }
    }

    pub const fn versions(self) -> &'static [&'static str] {
        match self {
            TemplateType::Cmrt => &["6.01", "6.1", "6.22", "6.31", "6.4", "6.5"],
            TemplateType::Emrt => &["1.1", "1.11", "1.2", "1.3", "2.0", "2.1"],
            TemplateType::Crt => &["2.2", "2.21"],
            TemplateType::Amrt => &["1.1", "1.2", "1.3"],
        }
    }

    pub fn supports_version(self, version: &str) -> bool {
        self.versions().contains(&version)
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TemplateType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegistryError::UnknownTemplateType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown template type: {0}")]
    UnknownTemplateType(String),
    #[error("unsupported {template_type} version: {version}")]
    UnsupportedVersion {
        template_type: TemplateType,
        version: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MineralInputMode {
    /// The template lists a fixed set of minerals; all are always in scope.
    Fixed,
    /// Minerals are picked from a template dropdown, with an `other` escape hatch.
    DynamicDropdown,
    /// Minerals are typed by the reporter into numbered slots.
    FreeText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MineralDef {
    pub key: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MineralScope {
    pub mode: MineralInputMode,
    pub minerals: Vec<MineralDef>,
    pub max_count: Option<usize>,
    pub other_slot_count: Option<usize>,
    pub default_custom_minerals: Vec<&'static str>,
}

impl MineralScope {
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.minerals.iter().map(|m| m.key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.minerals.iter().any(|m| m.key == key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuestionDef {
    pub key: &'static str,
    pub per_mineral: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompanyQuestionDef {
    pub key: &'static str,
    pub per_mineral: bool,
    pub has_comment_field: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SmelterListConfig {
    pub has_id_column: bool,
    pub has_lookup: bool,
    pub has_combined_column: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MineListConfig {
    pub available: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductListConfig {
    pub has_requester_columns: bool,
}

/// Company information keys, in the order they are laid out on the Declaration sheet.
pub const COMPANY_INFO_FIELDS: [&str; 14] = [
    "companyName",
    "declarationScope",
    "scopeDescription",
    "companyId",
    "companyAuthId",
    "address",
    "contactName",
    "contactEmail",
    "contactPhone",
    "authorizerName",
    "authorizerTitle",
    "authorizerEmail",
    "authorizerPhone",
    "authorizationDate",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TemplateVersionDef {
    pub template_type: TemplateType,
    pub version_id: &'static str,
    pub mineral_scope: MineralScope,
    pub company_info_fields: &'static [&'static str],
    pub questions: Vec<QuestionDef>,
    pub company_questions: Vec<CompanyQuestionDef>,
    pub smelter_list: SmelterListConfig,
    pub mine_list: MineListConfig,
    pub product_list: ProductListConfig,
}

impl TemplateVersionDef {
    pub fn question(&self, key: &str) -> Option<&QuestionDef> {
        self.questions.iter().find(|q| q.key == key)
    }

    pub fn company_question(&self, key: &str) -> Option<&CompanyQuestionDef> {
        self.company_questions.iter().find(|q| q.key == key)
    }
}

type DefTable = HashMap<(TemplateType, &'static str), TemplateVersionDef>;

static DEFINITIONS: OnceLock<DefTable> = OnceLock::new();

fn definitions() -> &'static DefTable {
    DEFINITIONS.get_or_init(|| {
        let mut table = HashMap::new();
        for template_type in TemplateType::ALL {
            for &version in template_type.versions() {
                table.insert((template_type, version), build(template_type, version));
            }
        }
        table
    })
}

/// Look up the definition for `template_type@version`.
pub fn version_def(
    template_type: TemplateType,
    version: &str,
) -> Result<&'static TemplateVersionDef, RegistryError> {
    definitions()
        .iter()
        .find(|((t, v), _)| *t == template_type && *v == version)
        .map(|(_, def)| def)
        .ok_or_else(|| RegistryError::UnsupportedVersion {
            template_type,
            version: version.to_string(),
        })
}

fn build(template_type: TemplateType, version: &'static str) -> TemplateVersionDef {
    match template_type {
        TemplateType::Cmrt => cmrt(version),
        TemplateType::Emrt => emrt(version),
        TemplateType::Crt => crt(version),
        TemplateType::Amrt => amrt(version),
    }
}

fn minerals(keys: &[&'static str]) -> Vec<MineralDef> {
    keys.iter().map(|&key| MineralDef { key }).collect()
}

fn questions(count: usize, per_mineral: bool) -> Vec<QuestionDef> {
    const KEYS: [&str; 8] = ["Q1", "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "Q8"];
    KEYS[..count]
        .iter()
        .map(|&key| QuestionDef { key, per_mineral })
        .collect()
}

fn company_questions(count: usize, per_mineral_keys: &[&str]) -> Vec<CompanyQuestionDef> {
    const KEYS: [&str; 9] = ["A", "B", "C", "D", "E", "F", "G", "H", "I"];
    KEYS[..count]
        .iter()
        .map(|&key| CompanyQuestionDef {
            key,
            per_mineral: per_mineral_keys.contains(&key),
            has_comment_field: true,
        })
        .collect()
}

fn fixed_scope(keys: &[&'static str]) -> MineralScope {
    MineralScope {
        mode: MineralInputMode::Fixed,
        minerals: minerals(keys),
        max_count: None,
        other_slot_count: None,
        default_custom_minerals: Vec::new(),
    }
}

fn cmrt(version: &'static str) -> TemplateVersionDef {
    TemplateVersionDef {
        template_type: TemplateType::Cmrt,
        version_id: version,
        mineral_scope: fixed_scope(&["tantalum", "tin", "gold", "tungsten"]),
        company_info_fields: &COMPANY_INFO_FIELDS,
        questions: questions(8, true),
        company_questions: company_questions(8, &[]),
        smelter_list: SmelterListConfig {
            has_id_column: true,
            has_lookup: true,
            has_combined_column: false,
        },
        mine_list: MineListConfig { available: false },
        product_list: ProductListConfig {
            has_requester_columns: false,
        },
    }
}

fn emrt(version: &'static str) -> TemplateVersionDef {
    let v2 = version.starts_with("2.");
    let mineral_scope = if v2 {
        MineralScope {
            mode: MineralInputMode::DynamicDropdown,
            minerals: minerals(&["cobalt", "copper", "graphite", "lithium", "mica", "nickel"]),
            max_count: None,
            other_slot_count: None,
            default_custom_minerals: Vec::new(),
        }
    } else {
        fixed_scope(&["cobalt", "mica"])
    };
    TemplateVersionDef {
        template_type: TemplateType::Emrt,
        version_id: version,
        mineral_scope,
        company_info_fields: &COMPANY_INFO_FIELDS,
        questions: questions(7, true),
        company_questions: company_questions(7, &["C"]),
        smelter_list: SmelterListConfig {
            has_id_column: true,
            has_lookup: true,
            has_combined_column: false,
        },
        mine_list: MineListConfig { available: v2 },
        product_list: ProductListConfig {
            has_requester_columns: version == "2.1",
        },
    }
}

fn crt(version: &'static str) -> TemplateVersionDef {
    TemplateVersionDef {
        template_type: TemplateType::Crt,
        version_id: version,
        mineral_scope: fixed_scope(&["cobalt"]),
        company_info_fields: &COMPANY_INFO_FIELDS,
        questions: questions(6, false),
        company_questions: company_questions(9, &[]),
        smelter_list: SmelterListConfig {
            has_id_column: true,
            has_lookup: true,
            has_combined_column: false,
        },
        mine_list: MineListConfig { available: false },
        product_list: ProductListConfig {
            has_requester_columns: false,
        },
    }
}

fn amrt(version: &'static str) -> TemplateVersionDef {
    let (mineral_scope, dropdown) = match version {
        "1.1" => (
            MineralScope {
                mode: MineralInputMode::FreeText,
                minerals: minerals(&[
                    "aluminum", "copper", "lithium", "nickel", "silver", "chromium", "zinc",
                ]),
                max_count: Some(10),
                other_slot_count: None,
                default_custom_minerals: vec![
                    "Aluminium",
                    "Copper",
                    "Lithium",
                    "Nickel",
                    "Silver",
                    "Chromium",
                    "Zinc",
                ],
            },
            false,
        ),
        "1.2" => (
            MineralScope {
                mode: MineralInputMode::FreeText,
                minerals: minerals(&[
                    "aluminum", "chromium", "copper", "lithium", "nickel", "silver", "zinc",
                ]),
                max_count: Some(10),
                other_slot_count: None,
                default_custom_minerals: vec!["铝", "铬", "铜", "锂", "镍", "银", "锌"],
            },
            false,
        ),
        _ => (
            MineralScope {
                mode: MineralInputMode::DynamicDropdown,
                minerals: minerals(&[
                    "aluminum",
                    "iridium",
                    "lime",
                    "manganese",
                    "palladium",
                    "platinum",
                    "rareEarthElements",
                    "rhodium",
                    "ruthenium",
                    "silver",
                    "sodaAsh",
                    "zinc",
                    "other",
                ]),
                max_count: Some(10),
                other_slot_count: Some(12),
                default_custom_minerals: Vec::new(),
            },
            true,
        ),
    };
    TemplateVersionDef {
        template_type: TemplateType::Amrt,
        version_id: version,
        mineral_scope,
        company_info_fields: &COMPANY_INFO_FIELDS,
        questions: questions(2, true),
        company_questions: Vec::new(),
        smelter_list: SmelterListConfig {
            has_id_column: dropdown,
            has_lookup: dropdown,
            has_combined_column: dropdown,
        },
        mine_list: MineListConfig { available: true },
        product_list: ProductListConfig {
            has_requester_columns: dropdown,
        },
    }
}
