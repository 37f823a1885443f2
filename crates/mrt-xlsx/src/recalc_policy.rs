use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::local_name;
use crate::package::XlsxPackage;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CALC_CHAIN_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";

/// How an exported template is told to recompute after cells were patched.
///
/// Patched inputs change what the template's formulas evaluate to, while their cached `<v>`
/// values and `xl/calcChain.xml` still describe the old inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalcPolicy {
    /// Set `<calcPr fullCalcOnLoad="1"/>` in `xl/workbook.xml`.
    pub force_full_calc_on_load: bool,
    /// Remove `xl/calcChain.xml` plus its workbook relationship and content-type override.
    pub drop_calc_chain: bool,
}

impl Default for RecalcPolicy {
    fn default() -> Self {
        Self {
            force_full_calc_on_load: true,
            drop_calc_chain: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecalcPolicyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
}

pub fn apply_recalc_policy(
    package: &mut XlsxPackage,
    policy: RecalcPolicy,
) -> Result<(), RecalcPolicyError> {
    if policy.force_full_calc_on_load {
        if let Some(workbook_xml) = package.part(WORKBOOK_PART) {
            let updated = workbook_xml_force_full_calc_on_load(workbook_xml)?;
            package.set_part(WORKBOOK_PART, updated);
        }
    }

    if policy.drop_calc_chain {
        if package.remove_part(CALC_CHAIN_PART).is_some() {
            log::debug!("removed {CALC_CHAIN_PART}");
        }

        if let Some(rels_xml) = package.part(WORKBOOK_RELS_PART) {
            let updated = remove_elements(rels_xml, b"Relationship", relationship_is_calc_chain)?;
            package.set_part(WORKBOOK_RELS_PART, updated);
        }

        if let Some(content_types_xml) = package.part(CONTENT_TYPES_PART) {
            let updated = remove_elements(content_types_xml, b"Override", override_is_calc_chain)?;
            package.set_part(CONTENT_TYPES_PART, updated);
        }
    }

    Ok(())
}

/// Sets `fullCalcOnLoad="1"` on the existing `<calcPr>`, or appends a `<calcPr>` as the last
/// child of `<workbook>` when there is none.
pub(crate) fn workbook_xml_force_full_calc_on_load(
    workbook_xml: &[u8],
) -> Result<Vec<u8>, RecalcPolicyError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));

    let mut buf = Vec::new();
    let mut saw_calc_pr = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(patched_calc_pr(e)?))?;
            }
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Start(patched_calc_pr(e)?))?;
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"workbook" => {
                if !saw_calc_pr {
                    let prefix = e.name().prefix().map(|p| p.as_ref().to_vec());
                    let tag = match prefix {
                        Some(p) => format!("{}:calcPr", String::from_utf8_lossy(&p)),
                        None => "calcPr".to_string(),
                    };
                    let mut calc_pr = BytesStart::new(tag);
                    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
                    writer.write_event(Event::Empty(calc_pr))?;
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Event::Eof => break,
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn patched_calc_pr(e: &BytesStart<'_>) -> Result<BytesStart<'static>, RecalcPolicyError> {
    let mut calc_pr = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr)
}

/// Copies `xml` through, dropping every `element` (and its subtree) for which `remove` holds.
fn remove_elements(
    xml: &[u8],
    element: &[u8],
    remove: fn(&BytesStart<'_>) -> Result<bool, RecalcPolicyError>,
) -> Result<Vec<u8>, RecalcPolicyError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(_) if skip_depth > 0 => skip_depth += 1,
            Event::End(_) if skip_depth > 0 => skip_depth -= 1,
            _ if skip_depth > 0 => {}
            Event::Start(ref e) if local_name(e.name().as_ref()) == element && remove(e)? => {
                skip_depth = 1;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == element && remove(e)? => {}
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn relationship_is_calc_chain(e: &BytesStart<'_>) -> Result<bool, RecalcPolicyError> {
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"Type" if value == CALC_CHAIN_REL_TYPE => return Ok(true),
            b"Target" if value.ends_with("calcChain.xml") => return Ok(true),
            _ => {}
        }
    }
    Ok(false)
}

fn override_is_calc_chain(e: &BytesStart<'_>) -> Result<bool, RecalcPolicyError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"PartName" {
            return Ok(attr.unescape_value()?.ends_with("calcChain.xml"));
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn utf8(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn inserts_calc_pr_before_workbook_end() {
        let xml = br#"<workbook><sheets><sheet name="A" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let out = utf8(workbook_xml_force_full_calc_on_load(xml).unwrap());
        assert_eq!(
            out,
            r#"<workbook><sheets><sheet name="A" sheetId="1" r:id="rId1"/></sheets><calcPr fullCalcOnLoad="1"/></workbook>"#
        );
    }

    #[test]
    fn patches_existing_calc_pr_keeping_other_attributes() {
        let xml = br#"<workbook><calcPr calcId="191029" fullCalcOnLoad="0"/></workbook>"#;
        let out = utf8(workbook_xml_force_full_calc_on_load(xml).unwrap());
        assert_eq!(
            out,
            r#"<workbook><calcPr calcId="191029" fullCalcOnLoad="1"/></workbook>"#
        );
    }

    #[test]
    fn drops_calc_chain_relationship_by_type_or_target() {
        let rels = br#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/><Relationship Id="rId10" Type="urn:custom" Target="/xl/calcChain.xml"></Relationship></Relationships>"#;
        let out = utf8(remove_elements(rels, b"Relationship", relationship_is_calc_chain).unwrap());
        assert_eq!(
            out,
            r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
        );
    }

    #[test]
    fn drops_calc_chain_content_type_override() {
        let ct = br#"<Types><Override PartName="/xl/workbook.xml" ContentType="a"/><Override PartName="/xl/calcChain.xml" ContentType="b"/></Types>"#;
        let out = utf8(remove_elements(ct, b"Override", override_is_calc_chain).unwrap());
        assert_eq!(
            out,
            r#"<Types><Override PartName="/xl/workbook.xml" ContentType="a"/></Types>"#
        );
    }
}
