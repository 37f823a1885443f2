use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedStringsError {
    #[error("xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed sharedStrings.xml: {0}")]
    Malformed(&'static str),
}

/// Visible text of every `<si>` entry, in table order.
///
/// Rich-text runs are concatenated; phonetic (`<rPh>`) and extension subtrees are skipped.
pub fn parse_shared_strings_xml(xml: &str) -> Result<Vec<String>, SharedStringsError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                items.push(parse_si(&mut reader)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"si" => items.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn parse_si(reader: &mut Reader<&[u8]>) -> Result<String, SharedStringsError> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, e.name())?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"r" => {
                text.push_str(&parse_run(reader)?);
            }
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"si" => break,
            Event::Eof => return Err(SharedStringsError::Malformed("unexpected eof in <si>")),
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

fn parse_run(reader: &mut Reader<&[u8]>) -> Result<String, SharedStringsError> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, e.name())?);
            }
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"r" => break,
            Event::Eof => return Err(SharedStringsError::Malformed("unexpected eof in <r>")),
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

fn read_text(reader: &mut Reader<&[u8]>, end: QName<'_>) -> Result<String, SharedStringsError> {
    let end = end.as_ref().to_vec();
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::End(e) if e.name().as_ref() == end.as_slice() => break,
            Event::Eof => return Err(SharedStringsError::Malformed("unexpected eof in <t>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn concatenates_runs_and_ignores_phonetic_text() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4">
  <si><t>Company name:</t></si>
  <si><r><rPr><b/></rPr><t>1) Is any </t></r><r><t xml:space="preserve">3TG intentionally added?</t></r></si>
  <si>
    <t>Base</t>
    <phoneticPr fontId="0" type="noConversion"/>
    <rPh sb="0" eb="4"><t>PHO</t></rPh>
  </si>
  <si><t>A &amp; B</t></si>
</sst>"#;

        let shared = parse_shared_strings_xml(xml).expect("parse sharedStrings.xml");
        assert_eq!(
            shared,
            vec![
                "Company name:",
                "1) Is any 3TG intentionally added?",
                "Base",
                "A & B",
            ]
        );
    }

    #[test]
    fn truncated_table_is_malformed() {
        let err = parse_shared_strings_xml("<sst><si><t>open").unwrap_err();
        assert!(matches!(err, SharedStringsError::Malformed(_) | SharedStringsError::Xml(_)));
    }
}
