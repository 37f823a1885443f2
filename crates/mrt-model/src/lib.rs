//! `mrt-model` holds the data shared by every layer of the mineral reporting toolchain:
//! - the registry of supported template types and versions
//! - the normalized report snapshot the UI layer edits
//! - A1 cell addressing and small value conversions used on export and import

mod address;
pub mod minerals;
pub mod registry;
mod snapshot;
pub mod transform;

pub use address::{A1ParseError, CellRef, MAX_COLS, MAX_ROWS};
pub use minerals::{active_mineral_keys, custom_mineral_labels, parse_other_mineral_key};
pub use registry::{
    version_def, CompanyQuestionDef, MineralInputMode, QuestionDef, RegistryError, TemplateType,
    TemplateVersionDef,
};
pub use snapshot::{
    AnswerValue, FormData, MineRow, MineralsScopeRow, ProductRow, ReportSnapshot, SmelterRow,
    SNAPSHOT_SCHEMA_VERSION,
};
