use crate::canonical::ActivityValidator;
use crate::config::ImporterConfig;
use crate::converters::{
    ArchiveExpander, ExtractionBudget, FileTypeConverter, KmzConverter, TtbinConverter,
    ZipExpander,
};
use crate::registry::{ParserRegistry, extension_of};
use crate::result::{ImportResult, ImportResultSet};
use crate::{ImporterError, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Entry point of the import pipeline: resolves archives and converters, runs the parsers and
/// cleans up the submitted files once the batch is done.
pub struct FileImporter {
    config: ImporterConfig,
    registry: ParserRegistry,
    expanders: Vec<Box<dyn ArchiveExpander>>,
    converters: Vec<Box<dyn FileTypeConverter>>,
}

impl FileImporter {
    pub fn new(config: ImporterConfig) -> Self {
        let limits = config.extraction_limits();
        let registry = ParserRegistry::with_distance_repair(config.distance_repair);
        let expanders: Vec<Box<dyn ArchiveExpander>> = vec![Box::new(ZipExpander::new(limits))];
        let converters: Vec<Box<dyn FileTypeConverter>> = vec![
            Box::new(KmzConverter::new(limits)),
            Box::new(TtbinConverter::new(config.ttbin_converter.clone())),
        ];

        Self {
            config,
            registry,
            expanders,
            converters,
        }
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Every extension the pipeline accepts: parsers, converters and archives.
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions = self.registry.list_extensions();
        extensions.extend(self.converters.iter().map(|c| c.convertible_extension().to_string()));
        extensions.extend(self.expanders.iter().map(|e| e.archive_extension().to_string()));
        extensions.sort();
        extensions.dedup();
        extensions
    }

    pub fn import_files<P: AsRef<Path>>(&self, paths: &[P]) -> ImportResultSet {
        let mut results = ImportResultSet::new();
        for path in paths {
            let path = path.as_ref();
            debug!("Importing {}", path.display());
            let mut budget = self.config.extraction_limits().budget();
            self.resolve(path, path, 0, &mut budget, &mut results);
        }

        self.finish_batch(&results);
        results
    }

    pub fn import_single_file(&self, path: impl AsRef<Path>) -> ImportResultSet {
        self.import_files(&[path.as_ref()])
    }

    fn resolve(
        &self,
        path: &Path,
        original: &Path,
        depth: usize,
        budget: &mut ExtractionBudget,
        results: &mut ImportResultSet,
    ) {
        let extension = extension_of(path).unwrap_or_default();

        if let Some(expander) = self
            .expanders
            .iter()
            .find(|e| e.archive_extension() == extension)
        {
            self.descend(path, original, depth, budget, results, |workdir, budget| {
                expander.expand(path, workdir, budget)
            });
        } else if let Some(converter) = self
            .converters
            .iter()
            .find(|c| c.convertible_extension() == extension)
        {
            self.descend(path, original, depth, budget, results, |workdir, budget| {
                converter.convert(path, workdir, budget)
            });
        } else {
            results.push(self.parse(path, original));
        }
    }

    /// Runs one expansion or conversion step in its own temporary directory. The outputs are
    /// resolved and parsed before the directory is removed. All steps below one submitted file
    /// share `budget`.
    fn descend(
        &self,
        path: &Path,
        original: &Path,
        depth: usize,
        budget: &mut ExtractionBudget,
        results: &mut ImportResultSet,
        transform: impl FnOnce(&Path, &mut ExtractionBudget) -> Result<Vec<PathBuf>>,
    ) {
        if depth >= self.config.max_archive_depth {
            results.push(ImportResult::failure(
                ImporterError::ConversionFailure(format!(
                    "{} is nested more than {} levels deep",
                    path.display(),
                    self.config.max_archive_depth
                )),
                path,
                original,
            ));
            return;
        }

        let workdir = match tempfile::Builder::new()
            .prefix("activity-import-")
            .tempdir()
        {
            Ok(dir) => dir,
            Err(e) => {
                results.push(ImportResult::failure(ImporterError::Io(e), path, original));
                return;
            }
        };

        match transform(workdir.path(), &mut *budget) {
            Ok(outputs) if outputs.is_empty() => {
                // nothing to parse, but the file still gets a result
                results.push(ImportResult::success(Vec::new(), path, original));
            }
            Ok(outputs) => {
                debug!(
                    "{} resolved into {} file(s) at depth {}, {} bytes used",
                    path.display(),
                    outputs.len(),
                    depth + 1,
                    budget.used()
                );
                for output in outputs {
                    self.resolve(&output, original, depth + 1, budget, results);
                }
            }
            Err(e) => {
                results.push(ImportResult::failure(as_conversion_failure(e, path), path, original));
            }
        }

        if let Err(e) = workdir.close() {
            warn!("Cannot remove temporary files of {}: {}", path.display(), e);
        }
    }

    fn parse(&self, path: &Path, original: &Path) -> ImportResult {
        let Some(registration) = self.registry.resolve_path(path) else {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            return ImportResult::failure(ImporterError::UnsupportedFormat(name), path, original);
        };

        let parser = registration.create();
        let format = parser.format_name();
        let outcome = parser.parse(path);
        if outcome.is_failed() {
            return ImportResult::failure(
                ImporterError::ParseFailure(outcome.errors().to_vec()),
                path,
                original,
            );
        }

        let activities = outcome.into_activities();
        for container in &activities {
            match ActivityValidator::validate(container) {
                Ok(report) => report.log_warnings(),
                Err(e) => return ImportResult::failure(e, path, original),
            }
        }

        debug!(
            "{} parser read {} activit(y/ies) from {}",
            format,
            activities.len(),
            path.display()
        );
        ImportResult::success(activities, path, original)
    }

    fn finish_batch(&self, results: &ImportResultSet) {
        for result in results {
            log_result(result);
        }

        if self.config.keep_originals {
            return;
        }

        // one decision per submitted file: any failure sends it to quarantine
        let mut originals: Vec<(&Path, bool)> = Vec::new();
        for result in results {
            let original = result.original_file_name();
            match originals.iter_mut().find(|(path, _)| *path == original) {
                Some((_, failed)) => *failed |= result.failed(),
                None => originals.push((original, result.failed())),
            }
        }

        for (original, failed) in originals {
            if !original.exists() {
                continue;
            }
            match (self.config.quarantine_dir(), failed) {
                (Some(dir), true) => match quarantine(original, dir) {
                    Ok(target) => info!(
                        "Moved {} to quarantine at {}",
                        original.display(),
                        target.display()
                    ),
                    Err(e) => warn!("Cannot quarantine {}: {}", original.display(), e),
                },
                _ => {
                    if let Err(e) = fs::remove_file(original) {
                        warn!("Cannot remove {}: {}", original.display(), e);
                    }
                }
            }
        }
    }
}

fn log_result(result: &ImportResult) {
    let name = result.display_name();
    match result.failure_cause() {
        Some(cause) => error!(
            file = %result.file_name().display(),
            original = %result.original_file_name().display(),
            "File upload of {} failed: {}",
            name,
            cause
        ),
        None => info!(
            file = %result.file_name().display(),
            activities = result.activities().len(),
            "Successful file upload of {}",
            name
        ),
    }
}

fn as_conversion_failure(error: ImporterError, path: &Path) -> ImporterError {
    match error {
        ImporterError::Io(e) => {
            ImporterError::ConversionFailure(format!("Cannot convert {}: {}", path.display(), e))
        }
        other => other,
    }
}

/// Moves `original` into `dir`, keeping its name unless that is taken.
fn quarantine(original: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mut target = dir.join(&name);
    if target.exists() {
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f");
        target = dir.join(format!("{}_{}", timestamp, name));
    }

    if fs::rename(original, &target).is_err() {
        // rename does not cross filesystems
        fs::copy(original, &target)?;
        fs::remove_file(original)?;
    }
    Ok(target)
}
