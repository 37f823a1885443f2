use std::io::{Cursor, Write};
use std::path::Path;
use std::process::{Command, Output};

use mrt_model::TemplateType;
use mrt_xlsx::AnchorMap;
use pretty_assertions::assert_eq;

/// A blank template whose Declaration sheet has questions 1 and 2 and company question A.
fn template_bytes() -> Vec<u8> {
    let cell = |r: &str, text: &str| format!(r#"<c r="{r}" t="inlineStr"><is><t>{text}</t></is></c>"#);
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:I20"/><sheetData><row r="10">{}</row><row r="12">{}</row><row r="14">{}</row><row r="15"><c r="D15"/></row><row r="16"><c r="D16"/></row></sheetData></worksheet>"#,
        cell("B10", "1) Is any tin intentionally added?"),
        cell("B12", "2) Is any tin necessary?"),
        cell("B14", "A. Do you have a policy?"),
    );
    let files = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Declaration" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, body) in files {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn install_template(templates: &Path, upper: &str, version: &str) {
    let dir = templates.join(upper);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("RMI_{upper}_{version}.xlsx")), template_bytes()).unwrap();
}

fn run(templates: &Path, out: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mrt_anchor_gen"))
        .arg("--templates")
        .arg(templates)
        .arg("--out")
        .arg(out)
        .args(extra)
        .output()
        .expect("run mrt-anchor-gen")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn generates_anchors_for_selected_templates() {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("templates");
    install_template(&templates, "CMRT", "6.5");
    let out = dir.path().join("data").join("anchors.json");

    let output = run(&templates, &out, &["--only", "cmrt@6.5"]);
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    assert!(stdout(&output).contains("Generated:"));

    let map = AnchorMap::from_json(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(map.len(), 1);
    let anchors = map.get(TemplateType::Cmrt, "6.5").unwrap();
    assert_eq!(anchors.question_row(1), Some(10));
    assert_eq!(anchors.question_span(1), 1);
    assert_eq!(anchors.question_row(2), Some(12));
    assert_eq!(anchors.company_row("A"), Some(14));
    assert_eq!(anchors.company_span("A"), 1);
}

#[test]
fn check_reports_fresh_and_stale_maps() {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("templates");
    install_template(&templates, "EMRT", "2.1");
    let out = dir.path().join("anchors.json");

    assert!(run(&templates, &out, &["--only", "emrt@2.1"]).status.success());

    let fresh = run(&templates, &out, &["--only", "emrt@2.1", "--check"]);
    assert!(fresh.status.success(), "stderr:\n{}", stderr(&fresh));
    assert!(stdout(&fresh).contains("up to date"));

    let stale_text = std::fs::read_to_string(&out).unwrap().replace("10", "11");
    std::fs::write(&out, &stale_text).unwrap();
    let stale = run(&templates, &out, &["--only", "emrt@2.1", "--check"]);
    assert_eq!(stale.status.code(), Some(1));
    assert!(stderr(&stale).contains("Excel mapping is out of date"));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), stale_text);
}

#[test]
fn only_keeps_other_entries_of_the_existing_map() {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("templates");
    install_template(&templates, "CRT", "2.21");
    install_template(&templates, "AMRT", "1.3");
    let out = dir.path().join("anchors.json");

    assert!(run(&templates, &out, &["--only", "crt@2.21"]).status.success());
    assert!(run(&templates, &out, &["--only", "amrt@1.3"]).status.success());

    let map = AnchorMap::from_json(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert!(map.get(TemplateType::Crt, "2.21").is_some());
    let amrt = map.get(TemplateType::Amrt, "1.3").unwrap();
    assert_eq!(amrt.amrt_q1_row, Some(10));
    assert_eq!(amrt.amrt_q2_row, Some(12));
}

#[test]
fn missing_template_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("anchors.json");

    let output = run(&dir.path().join("templates"), &out, &["--only", "cmrt@6.4"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("RMI_CMRT_6.4.xlsx"), "stderr:\n{}", stderr(&output));
    assert!(!out.exists());
}

#[test]
fn rejects_unknown_versions() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &dir.path().join("anchors.json"), &["--only", "cmrt@1.0"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("cmrt has no version"));
}
