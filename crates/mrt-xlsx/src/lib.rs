//! Template-preserving XLSX export for mineral reporting templates.
//!
//! The crate never rebuilds a workbook. It exposes:
//!
//! - [`XlsxPackage`]: the inflated OPC ZIP (part name -> bytes), repacked on write.
//! - [`DocumentContext`]: a package opened for patching, with its shared-string table and
//!   sheet-name to part-path map.
//! - [`cell`]: text-level reads and writes of single cells that keep every other byte of the
//!   worksheet intact.
//! - [`export_snapshot`]/[`export_to_xlsx`]: writes a [`mrt_model::ReportSnapshot`] into a
//!   blank template using the Declaration anchors in [`anchors`].
//! - [`scan`]: extraction of those anchors from blank templates, used offline.

pub mod anchors;
pub mod cell;
mod context;
mod export;
pub mod openxml;
mod package;
pub mod recalc_policy;
pub mod scan;
mod shared_strings;
mod workbook;
mod zip_util;

pub use anchors::{bundled_anchor_map, AnchorError, AnchorMap, DeclarationAnchors};
pub use cell::{is_formula_cell, read_cell_text, write_cell_inline_str, CellPatchError};
pub use context::{ContextError, DocumentContext};
pub use export::{
    export_snapshot, export_to_xlsx, ExportError, DECLARATION_SHEET, MINERALS_SCOPE_SHEET,
    MINE_LIST_SHEET, PRODUCT_LIST_SHEET, SMELTER_LIST_SHEET,
};
pub use package::{XlsxError, XlsxPackage, XlsxPackageLimits};
pub use recalc_policy::{apply_recalc_policy, RecalcPolicy, RecalcPolicyError};
pub use scan::{scan_declaration, scan_declaration_with_options, ScanError, ScanOptions};
pub use shared_strings::{parse_shared_strings_xml, SharedStringsError};
pub use workbook::{parse_workbook_sheets, WorkbookSheet};
