use quick_xml::events::Event;
use quick_xml::Reader;

use crate::package::XlsxError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"))
    }
}

/// Resolve a relationship target against the part that owns the relationship.
///
/// `/`-rooted targets are package-absolute; anything else is relative to the source part's
/// folder. `.` and `..` segments are collapsed and any `#fragment` is dropped.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split_once('#').map(|(t, _)| t).unwrap_or(target);

    let (target, base_dir) = match target.strip_prefix('/') {
        Some(absolute) => (absolute, ""),
        None => (
            target,
            base_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""),
        ),
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) | Event::Empty(start)
                if local_name(start.name().as_ref()).eq_ignore_ascii_case(b"Relationship") =>
            {
                let mut id = None;
                let mut target = None;
                let mut type_uri = None;
                let mut target_mode = None;
                for attr in start.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?.into_owned();
                    let key = local_name(attr.key.as_ref());
                    if key.eq_ignore_ascii_case(b"Id") {
                        id = Some(value);
                    } else if key.eq_ignore_ascii_case(b"Target") {
                        target = Some(value);
                    } else if key.eq_ignore_ascii_case(b"Type") {
                        type_uri = Some(value);
                    } else if key.eq_ignore_ascii_case(b"TargetMode") {
                        target_mode = Some(value);
                    }
                }
                if let (Some(id), Some(target), Some(type_uri)) = (id, target, type_uri) {
                    relationships.push(Relationship {
                        id,
                        type_uri,
                        target,
                        target_mode,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_relationships_captures_target_mode() {
        let rels = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId3" Target="missing-type.xml"/>
</Relationships>"#;

        let parsed = parse_relationships(rels).expect("parse relationships");
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_external());
        assert_eq!(parsed[1].id, "rId2");
        assert!(!parsed[1].is_external());
    }

    #[test]
    fn resolves_relative_absolute_and_dotted_targets() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "./worksheets/../worksheets/sheet3.xml#frag"),
            "xl/worksheets/sheet3.xml"
        );
    }
}
