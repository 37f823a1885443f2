use std::collections::BTreeMap;

use crate::cell;
use crate::openxml::{parse_relationships, resolve_target};
use crate::package::{XlsxError, XlsxPackage, XlsxPackageLimits};
use crate::recalc_policy::{apply_recalc_policy, RecalcPolicy, RecalcPolicyError};
use crate::shared_strings::{parse_shared_strings_xml, SharedStringsError};
use crate::workbook::parse_workbook_sheets;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
    #[error("invalid sharedStrings.xml: {0}")]
    SharedStrings(#[from] SharedStringsError),
    #[error("recalculation repair failed: {0}")]
    Recalc(#[from] RecalcPolicyError),
    #[error("sheet not found in template: {0}")]
    MissingSheet(String),
}

/// One template opened for patching.
///
/// Holds the inflated parts, the shared-string table and the sheet-name to part-path map.
/// Worksheet XML is kept as text and replaced wholesale on each write.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    package: XlsxPackage,
    shared_strings: Vec<String>,
    sheet_paths: BTreeMap<String, String>,
}

impl DocumentContext {
    pub fn load(bytes: &[u8]) -> Result<Self, ContextError> {
        Self::load_limited(bytes, XlsxPackageLimits::default())
    }

    pub fn load_limited(bytes: &[u8], limits: XlsxPackageLimits) -> Result<Self, ContextError> {
        let package = XlsxPackage::from_bytes_limited(bytes, limits)?;

        let workbook_xml = package
            .part(WORKBOOK_PART)
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_PART.to_string()))?;
        let rels_xml = package
            .part(WORKBOOK_RELS_PART)
            .ok_or_else(|| XlsxError::MissingPart(WORKBOOK_RELS_PART.to_string()))?;

        let sheets = parse_workbook_sheets(std::str::from_utf8(workbook_xml).map_err(XlsxError::from)?)?;
        let relationships = parse_relationships(rels_xml)?;

        let mut sheet_paths = BTreeMap::new();
        for sheet in sheets {
            let Some(rel) = relationships
                .iter()
                .find(|rel| rel.id == sheet.rel_id && !rel.is_external())
            else {
                log::warn!("sheet {:?} has no workbook relationship {}", sheet.name, sheet.rel_id);
                continue;
            };
            sheet_paths.insert(sheet.name, resolve_target(WORKBOOK_PART, &rel.target));
        }

        let shared_strings = match package.part(SHARED_STRINGS_PART) {
            Some(xml) => parse_shared_strings_xml(std::str::from_utf8(xml).map_err(XlsxError::from)?)?,
            None => Vec::new(),
        };

        Ok(Self {
            package,
            shared_strings,
            sheet_paths,
        })
    }

    pub fn shared_strings(&self) -> &[String] {
        &self.shared_strings
    }

    pub fn sheet_path(&self, name: &str) -> Option<&str> {
        self.sheet_paths.get(name).map(String::as_str)
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_path(name)
            .is_some_and(|path| self.package.part(path).is_some())
    }

    /// Worksheet XML of sheet `name`.
    pub fn sheet_xml(&self, name: &str) -> Result<String, ContextError> {
        let path = self
            .sheet_path(name)
            .ok_or_else(|| ContextError::MissingSheet(name.to_string()))?;
        let bytes = self
            .package
            .part(path)
            .ok_or_else(|| XlsxError::MissingPart(path.to_string()))?;
        Ok(std::str::from_utf8(bytes)
            .map_err(XlsxError::from)?
            .to_string())
    }

    pub fn set_sheet_xml(&mut self, name: &str, xml: String) -> Result<(), ContextError> {
        let path = self
            .sheet_path(name)
            .ok_or_else(|| ContextError::MissingSheet(name.to_string()))?
            .to_string();
        self.package.set_part(&path, xml.into_bytes());
        Ok(())
    }

    /// Reads one cell of sheet `name` as display text.
    pub fn read_cell_text(&self, sheet: &str, cell_ref: &str) -> Result<Option<String>, ContextError> {
        let xml = self.sheet_xml(sheet)?;
        Ok(cell::read_cell_text(&xml, cell_ref, &self.shared_strings))
    }

    /// Applies `policy` and repacks every part into a new zip.
    pub fn into_bytes(mut self, policy: RecalcPolicy) -> Result<Vec<u8>, ContextError> {
        apply_recalc_policy(&mut self.package, policy)?;
        Ok(self.package.write_to_bytes()?)
    }
}
