use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use thiserror::Error;

use crate::zip_util::{
    read_zip_file_bytes_with_budget, zip_part_names_equivalent, ZipInflateBudget,
    DEFAULT_MAX_ZIP_PART_BYTES, DEFAULT_MAX_ZIP_TOTAL_BYTES,
};

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing required attribute: {0}")]
    MissingAttr(&'static str),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error(
        "template part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("template is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
}

/// Size limits enforced by [`XlsxPackage::from_bytes_limited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XlsxPackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for XlsxPackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_ZIP_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_ZIP_TOTAL_BYTES,
        }
    }
}

/// Every part of a spreadsheet package, inflated and keyed by its zip entry name.
///
/// Parts are kept as raw bytes; only the parts a caller explicitly replaces change on
/// [`XlsxPackage::write_to_bytes`].
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, XlsxPackageLimits::default())
    }

    pub fn from_bytes_limited(bytes: &[u8], limits: XlsxPackageLimits) -> Result<Self, XlsxError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;

        let mut parts = BTreeMap::new();
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = file.name().to_string();
            let buf =
                read_zip_file_bytes_with_budget(&mut file, &name, limits.max_part_bytes, &mut budget)?;
            parts.insert(name, buf);
        }

        log::debug!("loaded spreadsheet package with {} parts", parts.len());
        Ok(Self { parts })
    }

    /// Stored entry name for `name`, tolerating a leading `/` and non-canonical producers.
    fn resolve_name(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.parts.get_key_value(name) {
            return Some(key.as_str());
        }
        let alt = match name.strip_prefix('/') {
            Some(stripped) => stripped.to_string(),
            None => format!("/{name}"),
        };
        if let Some((key, _)) = self.parts.get_key_value(alt.as_str()) {
            return Some(key.as_str());
        }
        self.parts
            .keys()
            .find(|key| zip_part_names_equivalent(key, name))
            .map(String::as_str)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let key = self.resolve_name(name)?;
        self.parts.get(key).map(Vec::as_slice)
    }

    /// Replace a part's bytes, writing to the stored entry if one already matches `name`.
    pub fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        let key = self
            .resolve_name(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string());
        self.parts.insert(key, bytes);
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let key = self.resolve_name(name)?.to_string();
        self.parts.remove(&key)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn build_package(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn from_bytes_limited_rejects_packages_exceeding_total_limit() {
        let bytes = build_package(&[("xl/a.xml", b"123456"), ("xl/b.xml", b"abcdef")]);
        let limits = XlsxPackageLimits {
            max_part_bytes: 10,
            max_total_bytes: 10,
        };

        match XlsxPackage::from_bytes_limited(&bytes, limits) {
            Err(XlsxError::PackageTooLarge { total, max }) => {
                assert_eq!(max, 10);
                assert!(total > max, "reported total {total} should exceed {max}");
            }
            other => panic!("expected PackageTooLarge error, got {other:?}"),
        }
    }

    #[test]
    fn part_lookup_tolerates_producer_quirks() {
        let bytes = build_package(&[("XL\\Workbook.xml", b"<workbook/>"), ("/docProps/app.xml", b"app")]);
        let pkg = XlsxPackage::from_bytes(&bytes).unwrap();

        assert_eq!(pkg.part("xl/workbook.xml"), Some(&b"<workbook/>"[..]));
        assert_eq!(pkg.part("docProps/app.xml"), Some(&b"app"[..]));
        assert_eq!(pkg.part("xl/missing.xml"), None);
    }

    #[test]
    fn set_part_reuses_stored_name_and_roundtrips() {
        let bytes = build_package(&[("xl/worksheets/sheet1.xml", b"<worksheet/>"), ("xl/calcChain.xml", b"<calcChain/>")]);
        let mut pkg = XlsxPackage::from_bytes(&bytes).unwrap();

        pkg.set_part("/xl/worksheets/sheet1.xml", b"<worksheet>patched</worksheet>".to_vec());
        assert!(pkg.remove_part("xl/calcChain.xml").is_some());

        let reread = XlsxPackage::from_bytes(&pkg.write_to_bytes().unwrap()).unwrap();
        assert_eq!(
            reread.part_names().collect::<Vec<_>>(),
            vec!["xl/worksheets/sheet1.xml"]
        );
        assert_eq!(
            reread.part("xl/worksheets/sheet1.xml"),
            Some(&b"<worksheet>patched</worksheet>"[..])
        );
    }
}
