//! Offline generator for the Declaration anchor map bundled with `mrt-xlsx`.
//!
//! Blank templates are expected at `<templates>/<TYPE>/RMI_<TYPE>_<version>.xlsx`. Each one's
//! Declaration sheet is scanned with [`mrt_xlsx::scan_declaration`] and the results are
//! collected into an [`AnchorMap`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use mrt_model::TemplateType;
use mrt_xlsx::{scan_declaration, AnchorMap, DeclarationAnchors, DocumentContext, DECLARATION_SHEET};

pub mod cli;

/// A registered `type@version` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateVersion {
    pub template_type: TemplateType,
    pub version: String,
}

impl FromStr for TemplateVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (template_type, version) = s
            .split_once('@')
            .ok_or_else(|| format!("expected <type>@<version>, got {s:?}"))?;
        let template_type: TemplateType = template_type.parse().map_err(|err| format!("{err}"))?;
        let version = version.trim();
        if !template_type.supports_version(version) {
            return Err(format!("{template_type} has no version {version:?}"));
        }
        Ok(Self {
            template_type,
            version: version.to_string(),
        })
    }
}

impl fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.template_type, self.version)
    }
}

/// Every registered template version, in registry order.
pub fn all_versions() -> Vec<TemplateVersion> {
    TemplateType::ALL
        .into_iter()
        .flat_map(|template_type| {
            template_type.versions().iter().map(move |version| TemplateVersion {
                template_type,
                version: version.to_string(),
            })
        })
        .collect()
}

pub fn template_path(templates: &Path, target: &TemplateVersion) -> PathBuf {
    let upper = target.template_type.as_upper();
    templates
        .join(upper)
        .join(format!("RMI_{upper}_{}.xlsx", target.version))
}

/// Scans the Declaration sheet of the blank template at `path`.
pub fn scan_template(path: &Path) -> Result<DeclarationAnchors> {
    let bytes = std::fs::read(path).with_context(|| format!("read template {}", path.display()))?;
    let ctx = DocumentContext::load(&bytes).with_context(|| format!("open template {}", path.display()))?;
    let xml = ctx
        .sheet_xml(DECLARATION_SHEET)
        .with_context(|| format!("{}: no {DECLARATION_SHEET} sheet", path.display()))?;
    scan_declaration(&xml, ctx.shared_strings())
        .with_context(|| format!("scan {DECLARATION_SHEET} sheet of {}", path.display()))
}

/// Scans `targets` (every registered version when empty) and records them over `base`.
pub fn generate(templates: &Path, targets: &[TemplateVersion], base: AnchorMap) -> Result<AnchorMap> {
    let targets = if targets.is_empty() {
        all_versions()
    } else {
        targets.to_vec()
    };

    let mut map = base;
    for target in &targets {
        let anchors = scan_template(&template_path(templates, target))?;
        log::debug!(
            "{target}: {} question anchors, {} company question anchors",
            anchors.question_header_row_by_number.len(),
            anchors.company_header_row_by_key.len()
        );
        map.insert(target.template_type, &target.version, anchors);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parses_type_at_version() {
        let target: TemplateVersion = "CMRT@6.5".parse().unwrap();
        assert_eq!(target.template_type, TemplateType::Cmrt);
        assert_eq!(target.version, "6.5");
        assert_eq!(target.to_string(), "cmrt@6.5");

        assert!("cmrt".parse::<TemplateVersion>().is_err());
        assert!("cmrt@9.9".parse::<TemplateVersion>().is_err());
        assert!("xyz@1.0".parse::<TemplateVersion>().is_err());
    }

    #[test]
    fn templates_are_laid_out_by_type() {
        let target: TemplateVersion = "amrt@1.3".parse().unwrap();
        assert_eq!(
            template_path(Path::new("templates"), &target),
            Path::new("templates").join("AMRT").join("RMI_AMRT_1.3.xlsx")
        );
    }

    #[test]
    fn every_registered_version_is_a_target() {
        let all = all_versions();
        let expected: usize = TemplateType::ALL.iter().map(|t| t.versions().len()).sum();
        assert_eq!(all.len(), expected);
        assert!(all.contains(&"emrt@2.1".parse().unwrap()));
    }

    #[test]
    fn missing_template_names_the_path() {
        let target: TemplateVersion = "crt@2.21".parse().unwrap();
        let err = generate(Path::new("/nonexistent"), &[target], AnchorMap::default()).unwrap_err();
        assert!(format!("{err:#}").contains("RMI_CRT_2.21.xlsx"), "{err:#}");
    }
}
