use super::{ExtractionBudget, FileTypeConverter};
use crate::{ImporterError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// TomTom binary activity, converted to TCX by the external `ttbincnv` tool.
pub struct TtbinConverter {
    binary: Option<PathBuf>,
}

impl TtbinConverter {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }
}

impl FileTypeConverter for TtbinConverter {
    fn convertible_extension(&self) -> &'static str {
        "ttbin"
    }

    fn convert(
        &self,
        path: &Path,
        workdir: &Path,
        budget: &mut ExtractionBudget,
    ) -> Result<Vec<PathBuf>> {
        let Some(binary) = &self.binary else {
            return Err(ImporterError::ConversionFailure(
                "No TTBIN converter configured (set TTBIN_CONVERTER)".to_string(),
            ));
        };

        let file_name = path.file_name().ok_or_else(|| {
            ImporterError::ConversionFailure(format!("Invalid TTBIN path: {}", path.display()))
        })?;

        // ttbincnv writes its output next to the input, so it runs on a copy inside workdir
        let input = workdir.join(file_name);
        let copied = fs::copy(path, &input)?;
        budget.charge(copied, path)?;

        debug!("Running {} -t {}", binary.display(), input.display());
        let output = Command::new(binary)
            .arg("-t")
            .arg(&input)
            .current_dir(workdir)
            .output()
            .map_err(|e| {
                ImporterError::ConversionFailure(format!(
                    "Cannot run {}: {}",
                    binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ImporterError::ConversionFailure(format!(
                "{} exited with {}: {}",
                binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let produced = produced_tcx_files(workdir)?;
        if produced.is_empty() {
            return Err(ImporterError::ConversionFailure(format!(
                "{} produced no TCX output",
                binary.display()
            )));
        }
        for file in &produced {
            budget.charge(fs::metadata(file)?.len(), path)?;
        }
        Ok(produced)
    }
}

fn produced_tcx_files(workdir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(workdir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("tcx"))
        })
        .collect();
    files.sort();
    Ok(files)
}
