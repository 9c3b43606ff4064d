use super::{ArchiveExpander, ExtractionBudget, ExtractionLimits};
use crate::{ImporterError, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

pub struct ZipExpander {
    limits: ExtractionLimits,
}

impl ZipExpander {
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }
}

impl ArchiveExpander for ZipExpander {
    fn archive_extension(&self) -> &'static str {
        "zip"
    }

    fn expand(
        &self,
        path: &Path,
        workdir: &Path,
        budget: &mut ExtractionBudget,
    ) -> Result<Vec<PathBuf>> {
        extract_members(path, workdir, &self.limits, budget, |_| true)
    }
}

/// Writes the accepted file members of a zip container below `workdir`, in archive order.
/// Every written byte is charged to `budget`.
pub(super) fn extract_members(
    path: &Path,
    workdir: &Path,
    limits: &ExtractionLimits,
    budget: &mut ExtractionBudget,
    accept: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    if archive.len() > limits.max_entries {
        return Err(ImporterError::ConversionFailure(format!(
            "{} contains {} entries, limit is {}",
            path.display(),
            archive.len(),
            limits.max_entries
        )));
    }

    let mut extracted = Vec::new();
    let mut taken = HashSet::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name().map(|name| normalized(&name)) else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        if relative.as_os_str().is_empty() || !accept(&relative) {
            continue;
        }

        let remaining = budget.remaining();
        if entry.size() > remaining {
            return Err(budget.exceeded(path));
        }

        let target = unique_target(workdir.join(&relative), &taken);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut output = File::create(&target)?;
        // the declared size can lie, so the copy itself is bounded too
        let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut output)?;
        budget.charge(written, path)?;

        debug!("Extracted {} ({} bytes)", relative.display(), written);
        taken.insert(target.clone());
        extracted.push(target);
    }

    Ok(extracted)
}

/// Resolves `.` and `..` so `./run.tcx` and `run.tcx` land on the same target.
fn normalized(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::ParentDir => {
                result.pop();
            }
            _ => {}
        }
    }
    result
}

/// `run.tcx`, then `run-2.tcx`, `run-3.tcx` for members that collide with an earlier one.
fn unique_target(target: PathBuf, taken: &HashSet<PathBuf>) -> PathBuf {
    if !taken.contains(&target) {
        return target;
    }

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (2..)
        .map(|n| target.with_file_name(format!("{}-{}{}", stem, n, extension)))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(target)
}
