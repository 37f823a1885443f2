use std::cmp::Ordering;
use std::collections::BTreeMap;

use mrt_model::registry::COMPANY_INFO_FIELDS;
use mrt_model::transform::{humanize_key, to_display_date};
use mrt_model::{AnswerValue, FormData, MineralInputMode, TemplateType, TemplateVersionDef};

use super::{cell, ExportError, MineralLabels, SheetPatch};
use crate::anchors::DeclarationAnchors;

const ANSWER_COL: &str = "D";
const COMMENT_COL: &str = "G";

const EMRT_SELECTION_SLOTS: [&str; 6] = ["D12", "E12", "G12", "D13", "E13", "G13"];
const EMRT_DELETE_LABEL_ROW: u32 = 175;

const AMRT_SELECTION_SLOTS: [&str; 12] = [
    "D12", "E12", "F12", "G12", "H12", "I12", "D13", "E13", "F13", "G13", "H13", "I13",
];
const AMRT_OTHER_SLOTS: [&str; 12] = [
    "D15", "E15", "F15", "G15", "H15", "I15", "D16", "E16", "F16", "G16", "H16", "I16",
];
const AMRT_MAX_SELECTED: usize = 10;
const AMRT_MAX_QUESTION_ROWS: usize = 10;
const AMRT_Q2_DEFAULT_ROWS: u32 = 10;

const SCOPE_OPTION_CELLS: [&str; 3] = ["P9", "Q9", "R9"];

pub(super) fn write_declaration(
    decl: &mut SheetPatch<'_>,
    def: &TemplateVersionDef,
    data: &FormData,
    anchors: &DeclarationAnchors,
    labels: &MineralLabels,
) -> Result<(), ExportError> {
    let dropdown = def.mineral_scope.mode == MineralInputMode::DynamicDropdown;
    match def.template_type {
        TemplateType::Emrt if dropdown => write_emrt_selection(decl, def, data)?,
        TemplateType::Amrt if dropdown => write_amrt_selection(decl, data, labels)?,
        _ => {}
    }

    write_company_info(decl, def, data)?;

    if def.template_type == TemplateType::Amrt {
        write_amrt_questions(decl, data, anchors, labels)
    } else {
        write_questions(decl, def, data, anchors)?;
        write_company_questions(decl, def, data, anchors)
    }
}

/// EMRT 2.x removes a mineral column by selecting the template's `(Delete X)` entry in its
/// slot; a kept mineral keeps the slot's current text.
fn write_emrt_selection(
    decl: &mut SheetPatch<'_>,
    def: &TemplateVersionDef,
    data: &FormData,
) -> Result<(), ExportError> {
    for (index, (key, slot)) in def
        .mineral_scope
        .keys()
        .zip(EMRT_SELECTION_SLOTS)
        .enumerate()
    {
        let keep = decl
            .read_original(slot)
            .unwrap_or_else(|| humanize_key(key));
        let text = if data.selected_minerals.iter().any(|s| s == key) {
            keep
        } else {
            decl.read_original(&cell("C", EMRT_DELETE_LABEL_ROW + index as u32))
                .unwrap_or_else(|| format!("(Delete {keep})"))
        };
        decl.write(slot, &text)?;
    }
    Ok(())
}

fn custom_labels(data: &FormData) -> Vec<&str> {
    if !data.selected_minerals.iter().any(|s| s == "other") {
        return Vec::new();
    }
    data.custom_minerals
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn write_amrt_selection(
    decl: &mut SheetPatch<'_>,
    data: &FormData,
    labels: &MineralLabels,
) -> Result<(), ExportError> {
    let values: Vec<String> = data
        .selected_minerals
        .iter()
        .filter(|k| !k.is_empty())
        .take(AMRT_MAX_SELECTED)
        .map(|k| labels.label(k))
        .collect();
    for (index, slot) in AMRT_SELECTION_SLOTS.iter().enumerate() {
        decl.write(slot, values.get(index).map(String::as_str).unwrap_or(""))?;
    }

    let others = custom_labels(data);
    if others.len() > AMRT_OTHER_SLOTS.len() {
        log::warn!(
            "{} custom minerals do not fit the template's {} slots",
            others.len(),
            AMRT_OTHER_SLOTS.len()
        );
    }
    for (index, slot) in AMRT_OTHER_SLOTS.iter().enumerate() {
        decl.write(slot, others.get(index).copied().unwrap_or(""))?;
    }
    Ok(())
}

/// Row where the company fields after `scopeDescription` start.
fn company_info_base_row(template_type: TemplateType) -> u32 {
    match template_type {
        TemplateType::Emrt => 16,
        TemplateType::Amrt => 17,
        TemplateType::Cmrt | TemplateType::Crt => 12,
    }
}

fn company_info_cell(template_type: TemplateType, key: &str) -> Option<String> {
    let index = COMPANY_INFO_FIELDS.iter().position(|&k| k == key)? as u32;
    let row = match index {
        0..=2 => 8 + index,
        _ => company_info_base_row(template_type) + index - 3,
    };
    Some(cell("D", row))
}

/// The template's own wording for scope `raw` (`"A"` -> `"A. Company"`), read from the
/// validation list cells beside the scope input.
fn scope_option_text(decl: &SheetPatch<'_>, raw: &str) -> String {
    let prefix = raw.trim();
    if prefix.is_empty() {
        return String::new();
    }
    let wanted = format!("{prefix}.");
    SCOPE_OPTION_CELLS
        .iter()
        .filter_map(|c| decl.read_original(c))
        .filter(|opt| !opt.trim().is_empty())
        .find(|opt| opt.trim().starts_with(&wanted))
        .unwrap_or_else(|| raw.to_string())
}

fn write_company_info(
    decl: &mut SheetPatch<'_>,
    def: &TemplateVersionDef,
    data: &FormData,
) -> Result<(), ExportError> {
    for &key in def.company_info_fields {
        let Some(target) = company_info_cell(def.template_type, key) else {
            continue;
        };
        let raw = data.company(key);
        if raw.is_empty() {
            continue;
        }
        let text = match key {
            "authorizationDate" => to_display_date(raw),
            "declarationScope" => scope_option_text(decl, raw),
            _ => raw.to_string(),
        };
        decl.write(&target, &text)?;
    }
    Ok(())
}

fn answer<'a>(answers: &'a BTreeMap<String, AnswerValue>, key: &str) -> Option<&'a AnswerValue> {
    answers.get(key)
}

fn flat<'a>(answers: &'a BTreeMap<String, AnswerValue>, key: &str) -> &'a str {
    answer(answers, key).map(AnswerValue::text).unwrap_or("")
}

fn for_mineral<'a>(answers: &'a BTreeMap<String, AnswerValue>, key: &str, mineral: &str) -> &'a str {
    answer(answers, key)
        .map(|a| a.for_mineral(mineral))
        .unwrap_or("")
}

fn write_pair(decl: &mut SheetPatch<'_>, row: u32, value: &str, comment: &str) -> Result<(), ExportError> {
    if !value.is_empty() {
        decl.write(&cell(ANSWER_COL, row), value)?;
    }
    if !comment.is_empty() {
        decl.write(&cell(COMMENT_COL, row), comment)?;
    }
    Ok(())
}

/// Per-mineral answers go one row per declared mineral below the header, never past the
/// block's span; flat answers go on the row right below the header.
fn write_questions(
    decl: &mut SheetPatch<'_>,
    def: &TemplateVersionDef,
    data: &FormData,
    anchors: &DeclarationAnchors,
) -> Result<(), ExportError> {
    for (index, question) in def.questions.iter().enumerate() {
        let number = index as u32 + 1;
        let row = anchors
            .question_row(number)
            .ok_or_else(|| ExportError::MissingAnchor {
                key: question.key.to_string(),
            })?;

        if !question.per_mineral {
            write_pair(
                decl,
                row + 1,
                flat(&data.questions, question.key),
                flat(&data.question_comments, question.key),
            )?;
            continue;
        }

        let span = anchors.question_span(number) as usize;
        for (offset, mineral) in def.mineral_scope.keys().take(span).enumerate() {
            write_pair(
                decl,
                row + 1 + offset as u32,
                for_mineral(&data.questions, question.key, mineral),
                for_mineral(&data.question_comments, question.key, mineral),
            )?;
        }
    }
    Ok(())
}

fn write_company_questions(
    decl: &mut SheetPatch<'_>,
    def: &TemplateVersionDef,
    data: &FormData,
    anchors: &DeclarationAnchors,
) -> Result<(), ExportError> {
    let answers = &data.company_questions;
    for question in &def.company_questions {
        let row = anchors
            .company_row(question.key)
            .ok_or_else(|| ExportError::MissingAnchor {
                key: question.key.to_string(),
            })?;
        let comment_key = format!("{}_comment", question.key);

        if !question.per_mineral {
            write_pair(
                decl,
                row,
                flat(answers, question.key),
                flat(answers, &comment_key),
            )?;
            continue;
        }

        let span = anchors.company_span(question.key) as usize;
        for (offset, mineral) in def.mineral_scope.keys().take(span).enumerate() {
            let comment = if question.has_comment_field {
                for_mineral(answers, &comment_key, mineral)
            } else {
                ""
            };
            write_pair(
                decl,
                row + 1 + offset as u32,
                for_mineral(answers, question.key, mineral),
                comment,
            )?;
        }
    }
    Ok(())
}

struct AmrtRow {
    key: String,
    label: String,
}

impl AmrtRow {
    fn is_custom(&self) -> bool {
        self.key.starts_with("custom-")
    }
}

fn compare_labels(a: &AmrtRow, b: &AmrtRow) -> Ordering {
    let (left, right) = (a.label.trim(), b.label.trim());
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
        .then_with(|| a.key.cmp(&b.key))
}

/// Mineral rows of the AMRT question matrix: selected minerals plus reporter-typed ones,
/// alphabetical by label, at most ten.
fn amrt_question_rows(data: &FormData, labels: &MineralLabels) -> Vec<AmrtRow> {
    let mut rows: Vec<AmrtRow> = data
        .selected_minerals
        .iter()
        .filter(|k| !k.is_empty() && k.as_str() != "other")
        .map(|k| AmrtRow {
            key: k.clone(),
            label: labels.label(k),
        })
        .chain(
            custom_labels(data)
                .into_iter()
                .enumerate()
                .map(|(index, label)| AmrtRow {
                    key: format!("custom-{index}"),
                    label: label.to_string(),
                }),
        )
        .filter(|row| !row.label.trim().is_empty())
        .collect();
    rows.sort_by(compare_labels);
    rows.truncate(AMRT_MAX_QUESTION_ROWS);
    rows
}

fn write_amrt_block(
    decl: &mut SheetPatch<'_>,
    data: &FormData,
    rows: &[AmrtRow],
    question_key: &str,
    first_row: u32,
    last_row: u32,
) -> Result<(), ExportError> {
    let capacity = (last_row + 1).saturating_sub(first_row) as usize;
    for (offset, row) in rows.iter().take(capacity).enumerate() {
        if row.is_custom() {
            continue;
        }
        write_pair(
            decl,
            first_row + offset as u32,
            for_mineral(&data.questions, question_key, &row.key),
            for_mineral(&data.question_comments, question_key, &row.key),
        )?;
    }
    Ok(())
}

fn write_amrt_questions(
    decl: &mut SheetPatch<'_>,
    data: &FormData,
    anchors: &DeclarationAnchors,
    labels: &MineralLabels,
) -> Result<(), ExportError> {
    let missing = |key: &str| ExportError::MissingAnchor {
        key: key.to_string(),
    };
    let q1 = anchors.amrt_q1_row.ok_or_else(|| missing("amrtQ1Row"))?;
    let q2 = anchors.amrt_q2_row.ok_or_else(|| missing("amrtQ2Row"))?;

    let rows = amrt_question_rows(data, labels);
    if rows.is_empty() {
        return Ok(());
    }

    write_amrt_block(decl, data, &rows, "Q1", q1 + 1, q2.saturating_sub(1))?;
    let q2_end = match anchors.amrt_q3_row {
        Some(q3) => q3.saturating_sub(1),
        None => q2 + AMRT_Q2_DEFAULT_ROWS,
    };
    write_amrt_block(decl, data, &rows, "Q2", q2 + 1, q2_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn company_info_rows_follow_template_family() {
        assert_eq!(company_info_cell(TemplateType::Cmrt, "companyName").as_deref(), Some("D8"));
        assert_eq!(company_info_cell(TemplateType::Cmrt, "scopeDescription").as_deref(), Some("D10"));
        assert_eq!(company_info_cell(TemplateType::Cmrt, "companyId").as_deref(), Some("D12"));
        assert_eq!(company_info_cell(TemplateType::Emrt, "companyId").as_deref(), Some("D16"));
        assert_eq!(company_info_cell(TemplateType::Amrt, "companyId").as_deref(), Some("D17"));
        assert_eq!(
            company_info_cell(TemplateType::Crt, "authorizationDate").as_deref(),
            Some("D22")
        );
        assert_eq!(company_info_cell(TemplateType::Crt, "unknown"), None);
    }

    #[test]
    fn amrt_rows_sort_by_label_and_cap_at_ten() {
        let data = FormData {
            selected_minerals: ["zinc", "silver", "other", "aluminum"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            custom_minerals: (0..9).map(|i| format!("Mineral {i}")).chain(["  ".to_string()]).collect(),
            ..FormData::default()
        };
        let labels = MineralLabels {
            by_key: BTreeMap::from([("aluminum".to_string(), "Aluminium".to_string())]),
        };

        let rows = amrt_question_rows(&data, &labels);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "aluminum", "custom-0", "custom-1", "custom-2", "custom-3", "custom-4",
                "custom-5", "custom-6", "custom-7", "custom-8",
            ]
        );
        assert_eq!(rows[0].label, "Aluminium");
    }
}
