//! Writes a [`ReportSnapshot`] into a blank template.
//!
//! Only input cells are touched; the template's formulas, validations and styles travel
//! through unchanged. Every sheet is patched in memory first and the package is repacked once
//! at the end, so a failure never yields a partial workbook.

mod declaration;
mod tables;

use std::collections::BTreeMap;

use mrt_model::transform::humanize_key;
use mrt_model::{version_def, RegistryError, ReportSnapshot, TemplateType, TemplateVersionDef};
use thiserror::Error;

use crate::anchors::{bundled_anchor_map, AnchorError, DeclarationAnchors};
use crate::cell::{is_formula_cell, read_cell_text, write_cell_inline_str, CellPatchError};
use crate::context::{ContextError, DocumentContext};
use crate::recalc_policy::RecalcPolicy;

pub const DECLARATION_SHEET: &str = "Declaration";
pub const SMELTER_LIST_SHEET: &str = "Smelter List";
pub const MINE_LIST_SHEET: &str = "Mine List";
pub const PRODUCT_LIST_SHEET: &str = "Product List";
pub const MINERALS_SCOPE_SHEET: &str = "Minerals Scope";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Cell(#[from] CellPatchError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Anchor(#[from] AnchorError),
    #[error("sheet not found in template: {0}")]
    MissingSheet(String),
    #[error("missing anchor mapping for {template_type}@{version}")]
    MissingAnchors {
        template_type: TemplateType,
        version: String,
    },
    #[error("Declaration anchor not found for {key}")]
    MissingAnchor { key: String },
}

pub(crate) fn cell(col: &str, row: u32) -> String {
    format!("{col}{row}")
}

/// One sheet being patched.
///
/// Reads that depend on the template's own text go through [`SheetPatch::read_original`] so
/// they never observe values written earlier in the same export.
pub(crate) struct SheetPatch<'a> {
    name: &'static str,
    original: String,
    xml: String,
    shared_strings: &'a [String],
    writes: usize,
}

impl<'a> SheetPatch<'a> {
    pub(crate) fn open(ctx: &'a DocumentContext, name: &'static str) -> Result<Self, ExportError> {
        if !ctx.has_sheet(name) {
            return Err(ExportError::MissingSheet(name.to_string()));
        }
        let xml = ctx.sheet_xml(name)?;
        Ok(Self {
            name,
            original: xml.clone(),
            xml,
            shared_strings: ctx.shared_strings(),
            writes: 0,
        })
    }

    pub(crate) fn read_original(&self, cell_ref: &str) -> Option<String> {
        read_cell_text(&self.original, cell_ref, self.shared_strings)
    }

    /// Writes `text`, failing on formula cells. An empty `text` clears the cell.
    pub(crate) fn write(&mut self, cell_ref: &str, text: &str) -> Result<(), ExportError> {
        self.xml = write_cell_inline_str(&self.xml, cell_ref, text, false)?;
        self.writes += 1;
        Ok(())
    }

    /// Writes a non-empty `text`. A formula cell is left alone unless the caller authorizes
    /// replacing the formula.
    pub(crate) fn write_smart(
        &mut self,
        cell_ref: &str,
        text: &str,
        allow_formula_overwrite: bool,
    ) -> Result<(), ExportError> {
        if text.is_empty() {
            return Ok(());
        }
        if !allow_formula_overwrite && is_formula_cell(&self.xml, cell_ref) {
            log::warn!("{}!{cell_ref} holds a template formula; keeping it", self.name);
            return Ok(());
        }
        self.xml = write_cell_inline_str(&self.xml, cell_ref, text, allow_formula_overwrite)?;
        self.writes += 1;
        Ok(())
    }

    fn into_xml(self) -> String {
        log::debug!("patched {} cells on {}", self.writes, self.name);
        self.xml
    }
}

fn patch_sheet<F>(ctx: &mut DocumentContext, name: &'static str, patch: F) -> Result<(), ExportError>
where
    F: FnOnce(&mut SheetPatch<'_>) -> Result<(), ExportError>,
{
    let xml = {
        let mut sheet = SheetPatch::open(ctx, name)?;
        patch(&mut sheet)?;
        sheet.into_xml()
    };
    ctx.set_sheet_xml(name, xml)?;
    Ok(())
}

/// Lowercase ASCII letters and digits only: `"Soda Ash"` and `"soda-ash"` compare equal.
pub(crate) fn normalize_token(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Text a mineral key is written as.
///
/// AMRT templates validate mineral cells against their own option list (Declaration
/// `B68:B90`), so AMRT labels come from that list; other templates use the humanized key.
pub(crate) struct MineralLabels {
    by_key: BTreeMap<String, String>,
}

impl MineralLabels {
    fn load(ctx: &DocumentContext, def: &TemplateVersionDef) -> Result<Self, ExportError> {
        if def.template_type != TemplateType::Amrt {
            return Ok(Self {
                by_key: BTreeMap::new(),
            });
        }
        let decl = SheetPatch::open(ctx, DECLARATION_SHEET)?;
        Ok(Self {
            by_key: amrt_option_map(&decl, def),
        })
    }

    pub(crate) fn label(&self, key: &str) -> String {
        self.by_key
            .get(key)
            .cloned()
            .unwrap_or_else(|| humanize_key(key))
    }
}

const AMRT_OPTION_ROWS: std::ops::RangeInclusive<u32> = 68..=90;

fn amrt_option_map(decl: &SheetPatch<'_>, def: &TemplateVersionDef) -> BTreeMap<String, String> {
    let options: Vec<String> = AMRT_OPTION_ROWS
        .filter_map(|row| decl.read_original(&cell("B", row)))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    let mut map = BTreeMap::new();
    if let Some(other) = options
        .iter()
        .find(|opt| opt.to_lowercase().contains("other"))
    {
        map.insert("other".to_string(), other.clone());
    }

    for key in def.mineral_scope.keys().filter(|&k| k != "other") {
        let aliases: Vec<String> = match key {
            "aluminum" => vec!["Aluminum".to_string(), "Aluminium".to_string()],
            "sodaAsh" => vec!["Soda Ash".to_string()],
            "rareEarthElements" => vec!["Rare Earth Elements".to_string()],
            _ => vec![humanize_key(key)],
        };
        let norms: Vec<String> = aliases.iter().map(|a| normalize_token(a)).collect();
        let label = options
            .iter()
            .find(|opt| norms.contains(&normalize_token(opt)))
            .cloned()
            .unwrap_or_else(|| aliases[0].clone());
        map.insert(key.to_string(), label);
    }

    map
}

fn check_anchors(def: &TemplateVersionDef, anchors: &DeclarationAnchors) -> Result<(), ExportError> {
    let missing = |key: &str| ExportError::MissingAnchor {
        key: key.to_string(),
    };

    if def.template_type == TemplateType::Amrt {
        anchors.amrt_q1_row.ok_or_else(|| missing("amrtQ1Row"))?;
        anchors.amrt_q2_row.ok_or_else(|| missing("amrtQ2Row"))?;
        return Ok(());
    }

    for (index, question) in def.questions.iter().enumerate() {
        let number = index as u32 + 1;
        anchors
            .question_row(number)
            .ok_or_else(|| missing(question.key))?;
    }
    for question in &def.company_questions {
        anchors
            .company_row(question.key)
            .ok_or_else(|| missing(question.key))?;
    }
    Ok(())
}

/// Patches `snapshot` into the template held by `ctx` and returns the repacked workbook.
pub fn export_snapshot(
    mut ctx: DocumentContext,
    snapshot: &ReportSnapshot,
    anchors: &DeclarationAnchors,
) -> Result<Vec<u8>, ExportError> {
    let def = version_def(snapshot.template_type, &snapshot.version_id)?;
    check_anchors(def, anchors)?;

    let data = &snapshot.data;
    let labels = MineralLabels::load(&ctx, def)?;

    patch_sheet(&mut ctx, DECLARATION_SHEET, |decl| {
        declaration::write_declaration(decl, def, data, anchors, &labels)
    })?;

    if !data.smelter_list.is_empty() {
        patch_sheet(&mut ctx, SMELTER_LIST_SHEET, |sheet| {
            tables::write_smelter_list(sheet, def, &data.smelter_list, &labels)
        })?;
    }

    if !data.mine_list.is_empty() && ctx.has_sheet(MINE_LIST_SHEET) {
        patch_sheet(&mut ctx, MINE_LIST_SHEET, |sheet| {
            tables::write_mine_list(sheet, &data.mine_list, &labels)
        })?;
    }

    if !data.product_list.is_empty() {
        patch_sheet(&mut ctx, PRODUCT_LIST_SHEET, |sheet| {
            tables::write_product_list(sheet, def, &data.product_list)
        })?;
    }

    if def.template_type == TemplateType::Amrt
        && !data.minerals_scope.is_empty()
        && ctx.has_sheet(MINERALS_SCOPE_SHEET)
    {
        patch_sheet(&mut ctx, MINERALS_SCOPE_SHEET, |sheet| {
            tables::write_minerals_scope(sheet, &data.minerals_scope, &data.custom_minerals, &labels)
        })?;
    }

    log::debug!(
        "exported {}@{} into template",
        snapshot.template_type,
        snapshot.version_id
    );
    Ok(ctx.into_bytes(RecalcPolicy::default())?)
}

/// Loads `template` and exports `snapshot` using the bundled anchor map.
pub fn export_to_xlsx(template: &[u8], snapshot: &ReportSnapshot) -> Result<Vec<u8>, ExportError> {
    let anchors = bundled_anchor_map()?
        .get(snapshot.template_type, &snapshot.version_id)
        .ok_or_else(|| ExportError::MissingAnchors {
            template_type: snapshot.template_type,
            version: snapshot.version_id.clone(),
        })?;
    let ctx = DocumentContext::load(template)?;
    export_snapshot(ctx, snapshot, anchors)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn token_normalization_ignores_case_and_punctuation() {
        assert_eq!(normalize_token("Soda Ash"), "sodaash");
        assert_eq!(normalize_token("rare-earth_Elements"), "rareearthelements");
        assert_eq!(normalize_token("Other [specify below]"), "otherspecifybelow");
    }

    #[test]
    fn anchors_are_checked_against_the_definition() {
        let def = version_def(TemplateType::Crt, "2.21").unwrap();
        let mut anchors = DeclarationAnchors::default();
        for n in 1..=6 {
            anchors.question_header_row_by_number.insert(n, 20 + 2 * n);
        }
        for (i, key) in ["A", "B", "C", "D", "E", "F", "G", "H"].iter().enumerate() {
            anchors
                .company_header_row_by_key
                .insert(key.to_string(), 40 + i as u32);
        }

        match check_anchors(def, &anchors) {
            Err(ExportError::MissingAnchor { key }) => assert_eq!(key, "I"),
            other => panic!("expected MissingAnchor, got {other:?}"),
        }

        anchors.company_header_row_by_key.insert("I".to_string(), 48);
        assert!(check_anchors(def, &anchors).is_ok());
    }

    #[test]
    fn amrt_requires_both_question_rows() {
        let def = version_def(TemplateType::Amrt, "1.3").unwrap();
        let anchors = DeclarationAnchors {
            amrt_q1_row: Some(30),
            ..DeclarationAnchors::default()
        };
        assert!(matches!(
            check_anchors(def, &anchors),
            Err(ExportError::MissingAnchor { key }) if key == "amrtQ2Row"
        ));
    }
}
