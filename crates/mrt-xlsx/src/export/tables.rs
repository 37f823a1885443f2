use mrt_model::minerals::parse_other_mineral_key;
use mrt_model::transform::normalize_smelter_lookup;
use mrt_model::{MineRow, MineralsScopeRow, ProductRow, SmelterRow, TemplateVersionDef};

use super::{cell, ExportError, MineralLabels, SheetPatch};

const SMELTER_FIRST_ROW: u32 = 5;
const MINE_FIRST_ROW: u32 = 5;
const PRODUCT_FIRST_ROW: u32 = 6;
const MINERALS_SCOPE_FIRST_ROW: u32 = 8;

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Smelter rows start at row 5.
///
/// With a smelter ID the row is written the way the template's "Option A" expects: the ID
/// goes to column A and the template's lookup formulas fill the rest, so formula cells are
/// kept. Without an ID the reporter's values replace those formulas.
pub(super) fn write_smelter_list(
    sheet: &mut SheetPatch<'_>,
    def: &TemplateVersionDef,
    rows: &[SmelterRow],
    labels: &MineralLabels,
) -> Result<(), ExportError> {
    let config = def.smelter_list;
    for (index, row) in rows.iter().enumerate() {
        let r = SMELTER_FIRST_ROW + index as u32;
        let smelter_id = text(&row.smelter_id).trim();
        let allow_overwrite = smelter_id.is_empty();

        if config.has_id_column && !smelter_id.is_empty() {
            sheet.write(&cell("A", r), smelter_id)?;
        }

        let metal = row.metal.trim();
        if !metal.is_empty() {
            sheet.write_smart(&cell("B", r), &labels.label(metal), allow_overwrite)?;
        }
        let lookup = row.smelter_lookup.trim();
        if config.has_lookup && !lookup.is_empty() {
            sheet.write_smart(&cell("C", r), &normalize_smelter_lookup(lookup), allow_overwrite)?;
        }

        let columns: [(&str, &str); 14] = [
            ("D", row.smelter_name.as_str()),
            ("E", row.smelter_country.as_str()),
            ("F", text(&row.smelter_identification)),
            ("G", text(&row.source_id)),
            ("H", text(&row.smelter_street)),
            ("I", text(&row.smelter_city)),
            ("J", text(&row.smelter_state)),
            ("K", text(&row.smelter_contact_name)),
            ("L", text(&row.smelter_contact_email)),
            ("M", text(&row.proposed_next_steps)),
            ("N", text(&row.mine_name)),
            ("O", text(&row.mine_country)),
            ("P", text(&row.recycled_scrap)),
            ("Q", text(&row.comments)),
        ];
        for (col, value) in columns {
            sheet.write_smart(&cell(col, r), value.trim(), allow_overwrite)?;
        }

        if config.has_combined_column {
            let combined_metal = text(&row.combined_metal).trim();
            if !combined_metal.is_empty() {
                sheet.write_smart(&cell("R", r), &labels.label(combined_metal), allow_overwrite)?;
            }
            sheet.write_smart(&cell("S", r), text(&row.combined_smelter).trim(), allow_overwrite)?;
        }
    }
    Ok(())
}

/// Writes each non-empty value of `values` at `(col, row)`.
fn write_row(sheet: &mut SheetPatch<'_>, row: u32, values: &[(&str, &str)]) -> Result<(), ExportError> {
    for &(col, value) in values {
        if !value.is_empty() {
            sheet.write(&cell(col, row), value)?;
        }
    }
    Ok(())
}

pub(super) fn write_mine_list(
    sheet: &mut SheetPatch<'_>,
    rows: &[MineRow],
    labels: &MineralLabels,
) -> Result<(), ExportError> {
    for (index, row) in rows.iter().enumerate() {
        let metal = if row.metal.is_empty() {
            String::new()
        } else {
            labels.label(&row.metal)
        };
        write_row(
            sheet,
            MINE_FIRST_ROW + index as u32,
            &[
                ("A", metal.as_str()),
                ("B", row.smelter_name.as_str()),
                ("C", row.mine_name.as_str()),
                ("D", text(&row.mine_id)),
                ("E", text(&row.mine_id_source)),
                ("F", row.mine_country.as_str()),
                ("G", text(&row.mine_street)),
                ("H", text(&row.mine_city)),
                ("I", row.mine_province.as_str()),
                ("J", text(&row.mine_contact_name)),
                ("K", text(&row.mine_contact_email)),
                ("L", text(&row.proposed_next_steps)),
                ("M", row.comments.as_str()),
            ],
        )?;
    }
    Ok(())
}

pub(super) fn write_product_list(
    sheet: &mut SheetPatch<'_>,
    def: &TemplateVersionDef,
    rows: &[ProductRow],
) -> Result<(), ExportError> {
    for (index, row) in rows.iter().enumerate() {
        let r = PRODUCT_FIRST_ROW + index as u32;
        if def.product_list.has_requester_columns {
            write_row(
                sheet,
                r,
                &[
                    ("B", row.product_number.as_str()),
                    ("C", row.product_name.as_str()),
                    ("D", text(&row.requester_number)),
                    ("E", text(&row.requester_name)),
                    ("F", row.comments.as_str()),
                ],
            )?;
        } else {
            write_row(
                sheet,
                r,
                &[
                    ("B", row.product_number.as_str()),
                    ("C", row.product_name.as_str()),
                    ("D", row.comments.as_str()),
                ],
            )?;
        }
    }
    Ok(())
}

/// AMRT "Minerals Scope" rows; `other-N` minerals are written as the reporter's label.
pub(super) fn write_minerals_scope(
    sheet: &mut SheetPatch<'_>,
    rows: &[MineralsScopeRow],
    custom_minerals: &[String],
    labels: &MineralLabels,
) -> Result<(), ExportError> {
    for (index, row) in rows.iter().enumerate() {
        let mineral = if row.mineral.starts_with("other-") {
            parse_other_mineral_key(&row.mineral)
                .and_then(|i| custom_minerals.get(i))
                .map(|label| label.trim().to_string())
                .unwrap_or_default()
        } else if row.mineral.is_empty() {
            String::new()
        } else {
            labels.label(&row.mineral)
        };
        write_row(
            sheet,
            MINERALS_SCOPE_FIRST_ROW + index as u32,
            &[("B", mineral.as_str()), ("C", row.reason.as_str())],
        )?;
    }
    Ok(())
}
