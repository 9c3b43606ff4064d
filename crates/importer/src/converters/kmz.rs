use super::archive::extract_members;
use super::{ExtractionBudget, ExtractionLimits, FileTypeConverter};
use crate::{ImporterError, Result};
use std::path::{Path, PathBuf};

/// KMZ is a zip container around KML documents; only the KML members are of interest.
pub struct KmzConverter {
    limits: ExtractionLimits,
}

impl KmzConverter {
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }
}

impl FileTypeConverter for KmzConverter {
    fn convertible_extension(&self) -> &'static str {
        "kmz"
    }

    fn convert(
        &self,
        path: &Path,
        workdir: &Path,
        budget: &mut ExtractionBudget,
    ) -> Result<Vec<PathBuf>> {
        let documents = extract_members(path, workdir, &self.limits, budget, |member| {
            member
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("kml"))
        })?;

        if documents.is_empty() {
            return Err(ImporterError::ConversionFailure(format!(
                "{} contains no KML document",
                path.display()
            )));
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::archive::tests::write_zip;

    #[test]
    fn test_extracts_only_kml() {
        let dir = tempfile::tempdir().unwrap();
        let kmz = dir.path().join("route.kmz");
        write_zip(
            &kmz,
            &[("doc.KML", b"<kml/>"), ("files/icon.png", b"\x89PNG")],
        );

        let workdir = tempfile::tempdir().unwrap();
        let limits = ExtractionLimits::default();
        let documents = KmzConverter::new(limits)
            .convert(&kmz, workdir.path(), &mut limits.budget())
            .unwrap();

        assert_eq!(documents, vec![workdir.path().join("doc.KML")]);
    }

    #[test]
    fn test_kmz_without_kml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let kmz = dir.path().join("empty.kmz");
        write_zip(&kmz, &[("readme.txt", b"hello")]);

        let limits = ExtractionLimits::default();
        let err = KmzConverter::new(limits)
            .convert(&kmz, dir.path(), &mut limits.budget())
            .unwrap_err();
        assert!(matches!(err, ImporterError::ConversionFailure(_)));
    }
}
