use std::io::Read;

use zip::read::ZipFile;

use crate::XlsxError;

/// Default maximum uncompressed size of any single template part inflated into memory.
pub(crate) const DEFAULT_MAX_ZIP_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Default maximum total uncompressed bytes across every part of one template.
pub(crate) const DEFAULT_MAX_ZIP_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Iterates the canonical bytes of a part name: `%xx` decoded, leading separators dropped,
/// `\` read as `/`, ASCII lowercased.
struct CanonicalName<'a> {
    rest: &'a [u8],
    leading: bool,
}

impl<'a> CanonicalName<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            rest: name.as_bytes(),
            leading: true,
        }
    }
}

impl Iterator for CanonicalName<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            let (&b, tail) = self.rest.split_first()?;
            let decoded = match (b, tail) {
                (b'%', [hi, lo, after @ ..]) => match (hex_val(*hi), hex_val(*lo)) {
                    (Some(hi), Some(lo)) => {
                        self.rest = after;
                        (hi << 4) | lo
                    }
                    _ => {
                        self.rest = tail;
                        b
                    }
                },
                _ => {
                    self.rest = tail;
                    b
                }
            };

            if self.leading && matches!(decoded, b'/' | b'\\') {
                continue;
            }
            self.leading = false;

            return Some(match decoded {
                b'\\' => b'/',
                other => other.to_ascii_lowercase(),
            });
        }
    }
}

/// Whether two part names denote the same part once producer quirks are ignored
/// (`XL\Workbook.xml` vs `xl/workbook.xml`, `/xl/...` vs `xl/...`, `%20` vs space).
pub(crate) fn zip_part_names_equivalent(a: &str, b: &str) -> bool {
    CanonicalName::new(a).eq(CanonicalName::new(b))
}

/// Running total of inflated bytes for one package read.
#[derive(Debug, Clone)]
pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn too_large(&self, extra: u64) -> XlsxError {
        XlsxError::PackageTooLarge {
            total: self.used_bytes.saturating_add(extra),
            max: self.max_total_bytes,
        }
    }

    fn consume(&mut self, bytes: u64) -> Result<(), XlsxError> {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        if self.used_bytes > self.max_total_bytes {
            return Err(XlsxError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Inflate one zip entry, refusing to go past either the per-part limit or the remaining
/// package budget.
///
/// The declared size is only a fast-path check; the read itself is capped at `limit + 1` bytes so
/// forged size headers cannot push more data into memory.
pub(crate) fn read_zip_file_bytes_with_budget<R: Read>(
    file: &mut ZipFile<'_, R>,
    part: &str,
    max_part_bytes: u64,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<u8>, XlsxError> {
    let remaining = budget.remaining_bytes();
    let effective_max = max_part_bytes.min(remaining);
    let limit_is_total = effective_max < max_part_bytes;

    let part_too_large = |size: u64| XlsxError::PartTooLarge {
        part: part.to_string(),
        size,
        max: max_part_bytes,
    };

    let declared = file.size();
    if declared > max_part_bytes {
        return Err(part_too_large(declared));
    }
    if limit_is_total && declared > effective_max {
        return Err(budget.too_large(declared));
    }

    let mut buf = Vec::new();
    file.take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > effective_max {
        return Err(if limit_is_total {
            budget.too_large(observed)
        } else {
            part_too_large(observed)
        });
    }

    budget.consume(observed)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::{ZipArchive, ZipWriter};

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn equivalent_names_ignore_case_separators_and_encoding() {
        assert!(zip_part_names_equivalent("XL\\Workbook.xml", "xl/workbook.xml"));
        assert!(zip_part_names_equivalent("/xl/workbook.xml", "xl/workbook.xml"));
        assert!(zip_part_names_equivalent(
            "xl/worksheets/sheet 1.xml",
            "xl/worksheets/sheet%201.xml"
        ));
        assert!(zip_part_names_equivalent(
            "xl/worksheets/sheet1.xml",
            "%2Fxl%2Fworksheets%2Fsheet1.xml"
        ));
        assert!(!zip_part_names_equivalent("xl/workbook.xml", "xl/workbook.xml.rels"));
    }

    #[test]
    fn part_limit_is_enforced_on_observed_bytes() {
        let bytes = build_zip(&[("a.txt", b"hello world")]); // 11 bytes
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_index(0).unwrap();
        let mut budget = ZipInflateBudget::new(100);

        let err = read_zip_file_bytes_with_budget(&mut file, "a.txt", 10, &mut budget).unwrap_err();
        match err {
            XlsxError::PartTooLarge { part, size, max } => {
                assert_eq!(part, "a.txt");
                assert_eq!(size, 11);
                assert_eq!(max, 10);
            }
            other => panic!("expected PartTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn budget_is_shared_across_parts() {
        let bytes = build_zip(&[("a.txt", b"123456"), ("b.txt", b"abcdef")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut budget = ZipInflateBudget::new(10);

        {
            let mut a = archive.by_index(0).unwrap();
            let read = read_zip_file_bytes_with_budget(&mut a, "a.txt", 100, &mut budget).unwrap();
            assert_eq!(read, b"123456");
        }
        let mut b = archive.by_index(1).unwrap();
        let err = read_zip_file_bytes_with_budget(&mut b, "b.txt", 100, &mut budget).unwrap_err();
        assert!(matches!(err, XlsxError::PackageTooLarge { max: 10, .. }));
    }
}
