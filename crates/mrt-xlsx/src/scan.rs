//! Extraction of [`DeclarationAnchors`] from a blank template's Declaration sheet.
//!
//! Question blocks are found by the numbering the templates put in column B (`1)`, `2)`, ...)
//! and company-question blocks by their letters (`A.`, `B)`, ...).

use std::collections::HashSet;
use std::sync::OnceLock;

use mrt_model::CellRef;
use regex::Regex;
use thiserror::Error;

use crate::anchors::DeclarationAnchors;
use crate::cell::read_cell_text;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid worksheet xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("No Declaration anchors found (column B)")]
    NoAnchors,
}

/// Row limits of the Declaration scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Used when the sheet has no `<dimension>`.
    pub default_max_row: u32,
    /// Last row searched for headers.
    pub header_scan_limit: u32,
    /// Rows past the sheet's last row the final block may extend into.
    pub tail_padding: u32,
    /// Hard cap on the final block's walk.
    pub tail_limit: u32,
    /// Consecutive empty rows that end the final block.
    pub empty_run_limit: u32,
    /// Last row searched for the AMRT third question.
    pub amrt_q3_limit: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            default_max_row: 500,
            header_scan_limit: 400,
            tail_padding: 50,
            tail_limit: 500,
            empty_run_limit: 8,
            amrt_q3_limit: 450,
        }
    }
}

fn question_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\)").expect("valid regex"))
}

fn company_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-I])[).]").expect("valid regex"))
}

fn single_digit_question() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d\)").expect("valid regex"))
}

struct DeclarationSheet<'a> {
    xml: &'a str,
    shared_strings: &'a [String],
    max_row: u32,
    cells: HashSet<CellRef>,
}

impl<'a> DeclarationSheet<'a> {
    fn parse(
        xml: &'a str,
        shared_strings: &'a [String],
        options: &ScanOptions,
    ) -> Result<Self, ScanError> {
        let doc = roxmltree::Document::parse(xml)?;

        let max_row = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "dimension")
            .and_then(|n| n.attribute("ref"))
            .and_then(dimension_max_row)
            .unwrap_or(options.default_max_row);

        let cells = doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "c")
            .filter_map(|n| n.attribute("r"))
            .filter_map(|r| CellRef::from_a1(r).ok())
            .collect();

        Ok(Self {
            xml,
            shared_strings,
            max_row,
            cells,
        })
    }

    /// Trimmed column-B text of `row`; `None` when the cell is missing or blank.
    fn label(&self, row: u32) -> Option<String> {
        let text = read_cell_text(self.xml, &format!("B{row}"), self.shared_strings)?;
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn has_cell(&self, column: &str, row: u32) -> bool {
        CellRef::from_column_row(column, row).is_ok_and(|cell| self.cells.contains(&cell))
    }
}

/// `"A1:I240"` -> 240.
fn dimension_max_row(reference: &str) -> Option<u32> {
    let last = reference.rsplit(':').next()?;
    let digits_at = last.find(|c: char| c.is_ascii_digit())?;
    last[digits_at..].parse().ok()
}

pub fn scan_declaration(
    sheet_xml: &str,
    shared_strings: &[String],
) -> Result<DeclarationAnchors, ScanError> {
    scan_declaration_with_options(sheet_xml, shared_strings, &ScanOptions::default())
}

pub fn scan_declaration_with_options(
    sheet_xml: &str,
    shared_strings: &[String],
    options: &ScanOptions,
) -> Result<DeclarationAnchors, ScanError> {
    let sheet = DeclarationSheet::parse(sheet_xml, shared_strings, options)?;
    let scan_end = sheet.max_row.min(options.header_scan_limit);

    let mut anchors = DeclarationAnchors::default();
    for row in 1..=scan_end {
        let Some(label) = sheet.label(row) else {
            continue;
        };
        if let Some(caps) = question_header().captures(&label) {
            if let Ok(number) = caps[1].parse::<u32>() {
                anchors.question_header_row_by_number.insert(number, row);
            }
            continue;
        }
        if let Some(caps) = company_header().captures(&label) {
            anchors
                .company_header_row_by_key
                .insert(caps[1].to_string(), row);
        }
    }

    if anchors.question_header_row_by_number.is_empty()
        && anchors.company_header_row_by_key.is_empty()
    {
        return Err(ScanError::NoAnchors);
    }

    let mut header_rows: Vec<u32> = anchors
        .question_header_row_by_number
        .values()
        .chain(anchors.company_header_row_by_key.values())
        .copied()
        .collect();
    header_rows.sort_unstable();

    anchors.question_span_by_number = anchors
        .question_header_row_by_number
        .iter()
        .map(|(&number, &row)| (number, block_span(&sheet, &header_rows, row, options)))
        .collect();
    anchors.company_span_by_key = anchors
        .company_header_row_by_key
        .iter()
        .map(|(key, &row)| (key.clone(), block_span(&sheet, &header_rows, row, options)))
        .collect();

    scan_amrt_rows(&sheet, scan_end, options, &mut anchors);

    Ok(anchors)
}

/// Rows between `row` and the next header. The last block has no next header, so it runs
/// until answer cells (D, G or B) stop appearing.
///
/// When the walk ends on a run of `empty_run_limit` blank rows, the last answer row is not
/// counted: the blank run is subtracted from a span that only covers the run's first
/// `empty_run_limit - 1` rows. The bundled anchor map follows this rule.
fn block_span(sheet: &DeclarationSheet<'_>, header_rows: &[u32], row: u32, options: &ScanOptions) -> u32 {
    if let Some(&next) = header_rows.iter().find(|&&r| r > row) {
        return next.saturating_sub(row + 1);
    }

    let walk_end = (sheet.max_row + options.tail_padding).min(options.tail_limit);
    let mut last_content = 0;
    let mut empty_run = 0;
    let mut ended_on_blank_run = false;
    for r in row + 1..=walk_end {
        if ["D", "G", "B"].iter().any(|col| sheet.has_cell(col, r)) {
            last_content = r - row;
            empty_run = 0;
            continue;
        }
        empty_run += 1;
        if empty_run >= options.empty_run_limit {
            ended_on_blank_run = true;
            break;
        }
    }
    let span = if ended_on_blank_run {
        last_content.saturating_sub(1)
    } else {
        last_content
    };
    log::warn!("span of last Declaration block at row {row} inferred as {span}; verify manually");
    span
}

fn scan_amrt_rows(
    sheet: &DeclarationSheet<'_>,
    scan_end: u32,
    options: &ScanOptions,
    anchors: &mut DeclarationAnchors,
) {
    for row in 1..=scan_end {
        let Some(label) = sheet.label(row) else {
            continue;
        };
        if anchors.amrt_q1_row.is_none() && label.starts_with("1)") {
            anchors.amrt_q1_row = Some(row);
        }
        if anchors.amrt_q2_row.is_none() && label.starts_with("2)") {
            anchors.amrt_q2_row = Some(row);
        }
        if anchors.amrt_q1_row.is_some() && anchors.amrt_q2_row.is_some() {
            break;
        }
    }

    let Some(q2) = anchors.amrt_q2_row else {
        return;
    };
    let q3_end = sheet.max_row.min(options.amrt_q3_limit);
    anchors.amrt_q3_row = (q2 + 1..=q3_end).find(|&row| {
        sheet
            .label(row)
            .is_some_and(|label| single_digit_question().is_match(&label))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    fn sheet(dimension: Option<&str>, cells: &[(&str, &str)]) -> String {
        let mut rows: BTreeMap<u32, String> = BTreeMap::new();
        for (r, text) in cells {
            let row = CellRef::from_a1(r).unwrap().row_number();
            let cell = if text.is_empty() {
                format!(r#"<c r="{r}"/>"#)
            } else {
                format!(r#"<c r="{r}" t="inlineStr"><is><t>{text}</t></is></c>"#)
            };
            rows.entry(row).or_default().push_str(&cell);
        }
        let body: String = rows
            .iter()
            .map(|(row, cells)| format!(r#"<row r="{row}">{cells}</row>"#))
            .collect();
        let dim = dimension
            .map(|d| format!(r#"<dimension ref="{d}"/>"#))
            .unwrap_or_default();
        format!(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{dim}<sheetData>{body}</sheetData></worksheet>"#)
    }

    #[test]
    fn finds_question_and_company_headers_with_spans() {
        let xml = sheet(
            Some("A1:I40"),
            &[
                ("B20", "1) Is any 3TG intentionally added?"),
                ("D21", ""),
                ("D22", ""),
                ("B23", "2) Does any 3TG remain?"),
                ("D24", ""),
                ("B26", "A. Do you have a policy?"),
                ("B27", "B) Is it public?"),
                ("D27", ""),
                ("D28", ""),
                ("G29", ""),
            ],
        );

        let anchors = scan_declaration(&xml, &[]).unwrap();
        assert_eq!(
            anchors.question_header_row_by_number,
            BTreeMap::from([(1, 20), (2, 23)])
        );
        assert_eq!(anchors.question_span_by_number, BTreeMap::from([(1, 2), (2, 2)]));
        assert_eq!(
            anchors.company_header_row_by_key,
            BTreeMap::from([("A".to_string(), 26), ("B".to_string(), 27)])
        );
        // D28 and G29 follow the last header; the closing blank run drops the last one.
        assert_eq!(anchors.company_span_by_key["A"], 0);
        assert_eq!(anchors.company_span_by_key["B"], 1);
        assert_eq!(anchors.amrt_q1_row, Some(20));
        assert_eq!(anchors.amrt_q2_row, Some(23));
        assert_eq!(anchors.amrt_q3_row, None);
    }

    #[test]
    fn reads_header_text_from_shared_strings() {
        let xml = r#"<worksheet><sheetData><row r="30"><c r="B30" t="s"><v>0</v></c></row><row r="42"><c r="B42" t="s"><v>1</v></c></row><row r="54"><c r="B54" t="s"><v>2</v></c></row></sheetData></worksheet>"#;
        let shared = vec![
            " 1) Which minerals?".to_string(),
            "2) Which smelters?".to_string(),
            "3) Anything else?".to_string(),
        ];
        let anchors = scan_declaration(xml, &shared).unwrap();
        assert_eq!(anchors.amrt_q1_row, Some(30));
        assert_eq!(anchors.amrt_q2_row, Some(42));
        assert_eq!(anchors.amrt_q3_row, Some(54));
        assert_eq!(anchors.question_span_by_number[&1], 11);
    }

    #[test]
    fn last_block_span_depends_on_how_the_walk_ends() {
        let cells = [("B10", "A. Policy"), ("D11", ""), ("D12", ""), ("D13", "")];

        // A1:I15 leaves room for eight blank rows after D13.
        let blank_run = scan_declaration(&sheet(Some("A1:I15"), &cells), &[]).unwrap();
        assert_eq!(blank_run.company_span("A"), 2);

        // The walk hits its end before eight blank rows.
        let options = ScanOptions {
            tail_padding: 0,
            ..ScanOptions::default()
        };
        let cut_short =
            scan_declaration_with_options(&sheet(Some("A1:I15"), &cells), &[], &options).unwrap();
        assert_eq!(cut_short.company_span("A"), 3);

        let header_only = scan_declaration(&sheet(Some("A1:I15"), &cells[..1]), &[]).unwrap();
        assert_eq!(header_only.company_span("A"), 0);
    }

    #[test]
    fn header_scan_stops_at_the_sheet_dimension() {
        let xml = sheet(Some("A1:I10"), &[("B5", "A. Policy"), ("B12", "1) Late question")]);
        let anchors = scan_declaration(&xml, &[]).unwrap();
        assert!(anchors.question_header_row_by_number.is_empty());
        assert_eq!(anchors.company_row("A"), Some(5));
    }

    #[test]
    fn sheet_without_headers_is_an_error() {
        let xml = sheet(None, &[("B3", "Company name:"), ("D3", "")]);
        assert!(matches!(scan_declaration(&xml, &[]), Err(ScanError::NoAnchors)));
    }

    #[test]
    fn dimension_row_parsing() {
        assert_eq!(dimension_max_row("A1:I240"), Some(240));
        assert_eq!(dimension_max_row("B7"), Some(7));
        assert_eq!(dimension_max_row("A1:XFD"), None);
    }
}
