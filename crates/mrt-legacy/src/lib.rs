//! Lossless round trip between [`mrt_model::ReportSnapshot`] and the legacy JSON questionnaire
//! documents (`cmtCompany`, `cmtRangeQuestions`, `cmtSmelters`, ...).
//!
//! [`to_internal`] reads a legacy document and returns the snapshot together with a
//! [`RoundtripContext`]. [`to_external`] writes an edited snapshot back by patching the original
//! document: untouched fields keep their JSON shape, unknown keys are carried through, and
//! deleted rows disappear. Documents that were never imported go through [`to_external_loose`].

mod context;
mod document;
mod field_state;
mod plan;
mod to_external;
mod to_internal;

pub use context::{
    EffectiveDateKind, EffectiveDateState, LegacyRowState, LegacyRows, ProductKeys,
    QuestionFieldStates, RoundtripContext,
};
pub use document::{parse_legacy_report, LegacyError, ParsedLegacyReport};
pub use field_state::{write_legacy_field, write_nullable_string, FieldStates, NullableFieldState};
pub use plan::{normalize_mineral_label, plan, LegacyPlan};
pub use to_external::{to_external, to_external_loose};
pub use to_internal::to_internal;
