//! Text-level reads and writes of single `<c>` elements inside worksheet XML.
//!
//! Worksheet XML is never re-serialized: a write splices a new `<c>` element over the byte range
//! of the old one, so every other byte of the sheet (formulas, validations, styles, cached
//! values) is preserved exactly.

use mrt_model::{A1ParseError, CellRef};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellPatchError {
    #[error("invalid cell reference {cell:?}: {source}")]
    InvalidRef { cell: String, source: A1ParseError },
    #[error("cell not found in template: {cell}")]
    CellNotFound { cell: String },
    #[error("refusing to overwrite formula cell: {cell}")]
    FormulaCell { cell: String },
}

/// Byte range of one `<c>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellSpan {
    start: usize,
    /// One past the `>` that closes the start tag.
    open_end: usize,
    /// Start of `</c>`; equal to `open_end` for `<c .../>`.
    body_end: usize,
    /// One past the whole element.
    end: usize,
}

impl CellSpan {
    fn open_tag<'a>(&self, sheet: &'a str) -> &'a str {
        &sheet[self.start..self.open_end]
    }

    fn body<'a>(&self, sheet: &'a str) -> &'a str {
        &sheet[self.open_end..self.body_end]
    }
}

fn canonical_ref(cell_ref: &str) -> Result<String, CellPatchError> {
    CellRef::from_a1(cell_ref)
        .map(CellRef::to_a1)
        .map_err(|source| CellPatchError::InvalidRef {
            cell: cell_ref.to_string(),
            source,
        })
}

fn find_cell(sheet: &str, a1: &str) -> Option<CellSpan> {
    let needle = format!("r=\"{a1}\"");
    let bytes = sheet.as_bytes();
    let mut from = 0;

    while let Some(found) = sheet[from..].find(&needle) {
        let attr_at = from + found;
        from = attr_at + needle.len();

        if attr_at == 0 || !bytes[attr_at - 1].is_ascii_whitespace() {
            continue;
        }
        let Some(start) = sheet[..attr_at].rfind("<c") else {
            continue;
        };
        // `<col`, `<cfRule`, ... are not cells; an intervening `>` means the attribute belongs
        // to some other element.
        if !bytes.get(start + 2).is_some_and(u8::is_ascii_whitespace)
            || sheet[start..attr_at].contains('>')
        {
            continue;
        }

        let open_end = attr_at + sheet[attr_at..].find('>')? + 1;
        if sheet[..open_end].ends_with("/>") {
            return Some(CellSpan {
                start,
                open_end,
                body_end: open_end,
                end: open_end,
            });
        }
        let body_end = open_end + sheet[open_end..].find("</c>")?;
        return Some(CellSpan {
            start,
            open_end,
            body_end,
            end: body_end + "</c>".len(),
        });
    }

    None
}

/// Value of attribute `name` in a start tag, undecoded.
fn attr_value<'a>(open_tag: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{name}=\"");
    let bytes = open_tag.as_bytes();
    let mut from = 0;
    while let Some(found) = open_tag[from..].find(&pattern) {
        let at = from + found;
        from = at + pattern.len();
        if at > 0 && bytes[at - 1].is_ascii_whitespace() {
            let value_start = at + pattern.len();
            let len = open_tag[value_start..].find('"')?;
            return Some(&open_tag[value_start..value_start + len]);
        }
    }
    None
}

/// Removes every ` t="..."` attribute (with its leading whitespace) from a start tag.
fn strip_type_attr(open_tag: &str) -> String {
    let mut out = String::with_capacity(open_tag.len());
    let mut rest = open_tag;
    loop {
        let Some(at) = find_type_attr(rest) else {
            out.push_str(rest);
            return out;
        };
        let ws_start = rest[..at].trim_end().len();
        out.push_str(&rest[..ws_start]);
        let value_start = at + "t=\"".len();
        match rest[value_start..].find('"') {
            Some(len) => rest = &rest[value_start + len + 1..],
            None => {
                out.push_str(&rest[ws_start..]);
                return out;
            }
        }
    }
}

fn find_type_attr(tag: &str) -> Option<usize> {
    let bytes = tag.as_bytes();
    let mut from = 0;
    while let Some(found) = tag[from..].find("t=\"") {
        let at = from + found;
        if at > 0 && bytes[at - 1].is_ascii_whitespace() {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

/// Position just past the start tag of the first `<name>` / `<name ...>` element in `xml`.
fn find_element_content(xml: &str, name: &str) -> Option<(usize, usize)> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let bytes = xml.as_bytes();
    let mut from = 0;
    while let Some(found) = xml[from..].find(&open) {
        let at = from + found;
        from = at + open.len();
        match bytes.get(from) {
            Some(b'>') => {}
            Some(b) if b.is_ascii_whitespace() => {}
            _ => continue,
        }
        let content_start = from + xml[from..].find('>')? + 1;
        if xml[..content_start].ends_with("/>") {
            return Some((content_start, content_start));
        }
        let content_end = content_start + xml[content_start..].find(&close)?;
        return Some((content_start, content_end));
    }
    None
}

fn has_formula(body: &str) -> bool {
    let bytes = body.as_bytes();
    body.match_indices("<f").any(|(at, _)| {
        bytes
            .get(at + 2)
            .is_some_and(|b| b.is_ascii_whitespace() || matches!(b, b'>' | b'/'))
    })
}

pub fn encode_xml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

pub fn decode_xml_text(text: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
        ("&amp;", '&'),
    ];

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Display text of a cell, or `None` when the sheet has no `<c>` element for `cell_ref`.
///
/// Inline strings yield their first `<t>`; shared strings are looked up by index (an index out
/// of range reads as empty); other cells yield their `<v>` text.
pub fn read_cell_text(sheet: &str, cell_ref: &str, shared_strings: &[String]) -> Option<String> {
    let a1 = canonical_ref(cell_ref).ok()?;
    let span = find_cell(sheet, &a1)?;
    let body = span.body(sheet);
    let cell_type = attr_value(span.open_tag(sheet), "t");

    if cell_type == Some("inlineStr") {
        return Some(
            find_element_content(body, "t")
                .map(|(s, e)| decode_xml_text(&body[s..e]))
                .unwrap_or_default(),
        );
    }

    let Some((s, e)) = find_element_content(body, "v") else {
        return Some(String::new());
    };
    let value = &body[s..e];
    if cell_type == Some("s") {
        return Some(
            value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| shared_strings.get(idx).cloned())
                .unwrap_or_default(),
        );
    }
    Some(decode_xml_text(value))
}

/// Whether the cell exists and carries a `<f>` formula element.
pub fn is_formula_cell(sheet: &str, cell_ref: &str) -> bool {
    canonical_ref(cell_ref)
        .ok()
        .and_then(|a1| find_cell(sheet, &a1))
        .is_some_and(|span| has_formula(span.body(sheet)))
}

/// Returns a copy of `sheet` with `cell_ref` holding `text` as an inline string.
///
/// The cell keeps its style and other attributes. An empty `text` clears the cell to a bare
/// self-closing element. Formula cells are refused unless `allow_formula_overwrite` is set.
pub fn write_cell_inline_str(
    sheet: &str,
    cell_ref: &str,
    text: &str,
    allow_formula_overwrite: bool,
) -> Result<String, CellPatchError> {
    let a1 = canonical_ref(cell_ref)?;
    let span = find_cell(sheet, &a1).ok_or_else(|| CellPatchError::CellNotFound {
        cell: a1.clone(),
    })?;

    if !allow_formula_overwrite && has_formula(span.body(sheet)) {
        return Err(CellPatchError::FormulaCell { cell: a1 });
    }

    let tag = strip_type_attr(span.open_tag(sheet));
    let replacement = if text.is_empty() {
        if tag.ends_with("/>") {
            tag
        } else {
            let head = tag.strip_suffix('>').unwrap_or(&tag);
            format!("{head}/>")
        }
    } else {
        let head = match tag.strip_suffix("/>") {
            Some(head) => head.trim_end(),
            None => tag.strip_suffix('>').unwrap_or(&tag),
        };
        format!(
            "{head} t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
            encode_xml_text(text)
        )
    };

    let mut out = String::with_capacity(sheet.len() + replacement.len());
    out.push_str(&sheet[..span.start]);
    out.push_str(&replacement);
    out.push_str(&sheet[span.end..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const SHEET: &str = r#"<worksheet><sheetData><row r="5"><c r="A5" s="3" t="s"><v>1</v></c><c r="B5" s="4"/><c r="C5"><f>SUM(1,2)</f><v>3</v></c><c r="D5" t="inlineStr"><is><t>R&amp;D</t></is></c><c r="E5" t="s"><v>9</v></c><c r="F5"><v>42</v></c></row></sheetData></worksheet>"#;

    fn shared() -> Vec<String> {
        vec!["zero".to_string(), "Acme & Co".to_string()]
    }

    #[test]
    fn reads_each_cell_kind() {
        let shared = shared();
        assert_eq!(read_cell_text(SHEET, "A5", &shared).as_deref(), Some("Acme & Co"));
        assert_eq!(read_cell_text(SHEET, "B5", &shared).as_deref(), Some(""));
        assert_eq!(read_cell_text(SHEET, "C5", &shared).as_deref(), Some("3"));
        assert_eq!(read_cell_text(SHEET, "D5", &shared).as_deref(), Some("R&D"));
        assert_eq!(read_cell_text(SHEET, "E5", &shared).as_deref(), Some(""));
        assert_eq!(read_cell_text(SHEET, "f5", &shared).as_deref(), Some("42"));
        assert_eq!(read_cell_text(SHEET, "Z9", &shared), None);
    }

    #[test]
    fn writes_inline_string_keeping_style_and_surroundings() {
        let out = write_cell_inline_str(SHEET, "A5", "Tom & \"Jerry\"", false).unwrap();
        assert!(out.contains(r#"<c r="A5" s="3" t="inlineStr"><is><t xml:space="preserve">Tom &amp; &quot;Jerry&quot;</t></is></c><c r="B5" s="4"/>"#));
        assert!(out.starts_with(r#"<worksheet><sheetData><row r="5">"#));
        assert!(out.ends_with(r#"<c r="F5"><v>42</v></c></row></sheetData></worksheet>"#));
        assert_eq!(
            read_cell_text(&out, "A5", &shared()).as_deref(),
            Some("Tom & \"Jerry\"")
        );
    }

    #[test]
    fn self_closing_cell_becomes_open_element() {
        let out = write_cell_inline_str(SHEET, "B5", "x", false).unwrap();
        assert!(out.contains(r#"<c r="B5" s="4" t="inlineStr"><is><t xml:space="preserve">x</t></is></c><c r="C5">"#));
    }

    #[test]
    fn clearing_produces_minimal_self_closing_cell() {
        let out = write_cell_inline_str(SHEET, "A5", "", false).unwrap();
        assert!(out.contains(r#"<row r="5"><c r="A5" s="3"/><c r="B5" s="4"/>"#));
        assert!(!out.contains("//>"));

        let again = write_cell_inline_str(&out, "A5", "", false).unwrap();
        assert_eq!(again, out);
        let cleared_b = write_cell_inline_str(SHEET, "B5", "", false).unwrap();
        assert_eq!(cleared_b, SHEET);
    }

    #[test]
    fn formula_cells_are_protected() {
        let err = write_cell_inline_str(SHEET, "C5", "x", false).unwrap_err();
        assert_eq!(
            err,
            CellPatchError::FormulaCell {
                cell: "C5".to_string()
            }
        );
        assert_eq!(err.to_string(), "refusing to overwrite formula cell: C5");
        assert!(is_formula_cell(SHEET, "C5"));
        assert!(!is_formula_cell(SHEET, "A5"));

        // clearing is refused too
        assert!(write_cell_inline_str(SHEET, "C5", "", false).is_err());

        let out = write_cell_inline_str(SHEET, "C5", "override", true).unwrap();
        assert!(out.contains(r#"<c r="C5" t="inlineStr"><is><t xml:space="preserve">override</t></is></c>"#));
        assert!(!is_formula_cell(&out, "C5"));
    }

    #[test]
    fn missing_and_invalid_references_are_errors() {
        assert_eq!(
            write_cell_inline_str(SHEET, "G5", "x", false).unwrap_err(),
            CellPatchError::CellNotFound {
                cell: "G5".to_string()
            }
        );
        assert!(matches!(
            write_cell_inline_str(SHEET, "5A", "x", false),
            Err(CellPatchError::InvalidRef { .. })
        ));
    }

    #[test]
    fn ignores_lookalike_attributes() {
        let sheet = r#"<worksheet><cols><col r="A5"/></cols><sheetData><row r="5"><c r="A5"><v>1</v></c></row></sheetData></worksheet>"#;
        let out = write_cell_inline_str(sheet, "A5", "y", false).unwrap();
        assert!(out.contains(r#"<col r="A5"/>"#));
        assert_eq!(read_cell_text(&out, "A5", &[]).as_deref(), Some("y"));
    }

    #[test]
    fn entity_codec() {
        assert_eq!(encode_xml_text(r#"<a & 'b'>"#), "&lt;a &amp; &apos;b&apos;&gt;");
        assert_eq!(decode_xml_text("&amp;lt; &lt; &unknown;"), "&lt; < &unknown;");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn prop_written_text_reads_back(text in "\\PC{0,40}") {
            let out = write_cell_inline_str(SHEET, "B5", &text, false).unwrap();
            prop_assert_eq!(read_cell_text(&out, "B5", &[]), Some(text.clone()));
            // untouched cells keep their exact markup
            prop_assert!(out.contains(r#"<c r="C5"><f>SUM(1,2)</f><v>3</v></c>"#));
        }
    }
}
