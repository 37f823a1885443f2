use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::package::XlsxError;

/// A `<sheet>` entry of `xl/workbook.xml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkbookSheet {
    pub name: String,
    pub rel_id: String,
}

pub fn parse_workbook_sheets(workbook_xml: &str) -> Result<Vec<WorkbookSheet>, XlsxError> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                sheets.push(parse_sheet_element(&e)?);
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn parse_sheet_element(e: &BytesStart<'_>) -> Result<WorkbookSheet, XlsxError> {
    let mut name = None;
    let mut rel_id = None;

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"name" {
            name = Some(attr.unescape_value()?.into_owned());
        } else if key != b"sheetId" && local_name(key) == b"id" {
            rel_id = Some(attr.unescape_value()?.into_owned());
        }
    }

    Ok(WorkbookSheet {
        name: name.ok_or(XlsxError::MissingAttr("name"))?,
        rel_id: rel_id.ok_or(XlsxError::MissingAttr("r:id"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn reads_names_and_relationship_ids() {
        let xml = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Declaration" sheetId="1" r:id="rId1"/>
    <sheet name="Smelter &amp; Refiner" sheetId="2" state="hidden" r:id="rId2"/>
  </sheets>
</workbook>"#;

        let sheets = parse_workbook_sheets(xml).unwrap();
        assert_eq!(
            sheets,
            vec![
                WorkbookSheet {
                    name: "Declaration".to_string(),
                    rel_id: "rId1".to_string(),
                },
                WorkbookSheet {
                    name: "Smelter & Refiner".to_string(),
                    rel_id: "rId2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn missing_relationship_id_is_an_error() {
        let err = parse_workbook_sheets(r#"<workbook><sheets><sheet name="A" sheetId="1"/></sheets></workbook>"#)
            .unwrap_err();
        assert!(matches!(err, XlsxError::MissingAttr("r:id")));
    }
}
