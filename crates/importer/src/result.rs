use crate::ImporterError;
use crate::canonical::ActivityDataContainer;
use crate::error::ErrorKind;
use std::path::{Path, PathBuf};

/// Outcome for one file that reached a parser (or failed before reaching one).
#[derive(Debug)]
pub struct ImportResult {
    activities: Vec<ActivityDataContainer>,
    file_name: PathBuf,
    original_file_name: PathBuf,
    failure: Option<ImporterError>,
}

impl ImportResult {
    pub fn success(
        activities: Vec<ActivityDataContainer>,
        file_name: impl Into<PathBuf>,
        original_file_name: impl Into<PathBuf>,
    ) -> Self {
        Self {
            activities,
            file_name: file_name.into(),
            original_file_name: original_file_name.into(),
            failure: None,
        }
    }

    pub fn failure(
        error: ImporterError,
        file_name: impl Into<PathBuf>,
        original_file_name: impl Into<PathBuf>,
    ) -> Self {
        Self {
            activities: Vec::new(),
            file_name: file_name.into(),
            original_file_name: original_file_name.into(),
            failure: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure_cause(&self) -> Option<&ImporterError> {
        self.failure.as_ref()
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(ImporterError::kind)
    }

    /// Ordered diagnostics; empty for a successful result.
    pub fn errors(&self) -> Vec<String> {
        self.failure
            .as_ref()
            .map(ImporterError::messages)
            .unwrap_or_default()
    }

    pub fn activities(&self) -> &[ActivityDataContainer] {
        &self.activities
    }

    pub fn into_activities(self) -> Vec<ActivityDataContainer> {
        self.activities
    }

    /// The file that was actually parsed, which may be a converted or extracted one.
    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    /// The path as submitted to the importer.
    pub fn original_file_name(&self) -> &Path {
        &self.original_file_name
    }

    /// `run.tcx`, or `run.tcx (original week.zip)` when the parsed file came out of another one.
    pub fn display_name(&self) -> String {
        let name = base_name(&self.file_name);
        let original = base_name(&self.original_file_name);
        if self.file_name == self.original_file_name || name == original {
            name
        } else {
            format!("{} (original {})", name, original)
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Empty,
    Succeeded,
    PartiallySucceeded,
    Failed,
}

/// Results in submission order, expanded files in the order they were resolved.
#[derive(Debug, Default)]
pub struct ImportResultSet {
    results: Vec<ImportResult>,
}

impl ImportResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ImportResult) {
        self.results.push(result);
    }

    pub fn merge(&mut self, other: ImportResultSet) {
        self.results.extend(other.results);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImportResult> {
        self.results.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImportResult> {
        self.results.iter()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ImportResult> {
        self.results.iter().filter(|r| r.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ImportResult> {
        self.results.iter().filter(|r| r.failed())
    }

    pub fn activities(&self) -> impl Iterator<Item = &ActivityDataContainer> {
        self.results.iter().flat_map(|r| r.activities.iter())
    }

    pub fn into_activities(self) -> Vec<ActivityDataContainer> {
        self.results
            .into_iter()
            .flat_map(ImportResult::into_activities)
            .collect()
    }

    pub fn status(&self) -> BatchStatus {
        let failed = self.failed().count();
        match (self.results.len(), failed) {
            (0, _) => BatchStatus::Empty,
            (_, 0) => BatchStatus::Succeeded,
            (total, failed) if failed == total => BatchStatus::Failed,
            _ => BatchStatus::PartiallySucceeded,
        }
    }
}

impl IntoIterator for ImportResultSet {
    type Item = ImportResult;
    type IntoIter = std::vec::IntoIter<ImportResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a ImportResultSet {
    type Item = &'a ImportResult;
    type IntoIter = std::slice::Iter<'a, ImportResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
