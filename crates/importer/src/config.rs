use crate::canonical::DistanceRepair;
use crate::converters::ExtractionLimits;
use crate::{ImporterError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImporterConfig {
    /// Where originals of failed imports are moved; `None` deletes them instead.
    pub quarantine_dir: Option<PathBuf>,
    /// Leave submitted files untouched after the batch.
    pub keep_originals: bool,
    pub max_archive_depth: usize,
    pub max_archive_entries: usize,
    pub max_extracted_bytes: u64,
    pub ttbin_converter: Option<PathBuf>,
    pub distance_repair: DistanceRepair,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        let limits = ExtractionLimits::default();
        Self {
            quarantine_dir: None,
            keep_originals: false,
            max_archive_depth: 4,
            max_archive_entries: limits.max_entries,
            max_extracted_bytes: limits.max_bytes,
            ttbin_converter: None,
            distance_repair: DistanceRepair::default(),
        }
    }
}

impl ImporterConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            quarantine_dir: value("IMPORT_QUARANTINE_DIR").map(PathBuf::from),
            keep_originals: match value("IMPORT_KEEP_ORIGINALS") {
                Some(raw) => parse_bool("IMPORT_KEEP_ORIGINALS", &raw)?,
                None => defaults.keep_originals,
            },
            max_archive_depth: parse_or(
                "IMPORT_MAX_ARCHIVE_DEPTH",
                value,
                defaults.max_archive_depth,
            )?,
            max_archive_entries: parse_or(
                "IMPORT_MAX_ARCHIVE_ENTRIES",
                value,
                defaults.max_archive_entries,
            )?,
            max_extracted_bytes: parse_or(
                "IMPORT_MAX_EXTRACTED_BYTES",
                value,
                defaults.max_extracted_bytes,
            )?,
            ttbin_converter: value("TTBIN_CONVERTER").map(PathBuf::from),
            distance_repair: parse_or("IMPORT_DISTANCE_REPAIR", value, defaults.distance_repair)?,
        })
    }

    /// The quarantine directory, treating an empty path as unset.
    pub fn quarantine_dir(&self) -> Option<&Path> {
        self.quarantine_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    pub fn extraction_limits(&self) -> ExtractionLimits {
        ExtractionLimits {
            max_entries: self.max_archive_entries,
            max_bytes: self.max_extracted_bytes,
        }
    }
}

fn parse_or<T>(key: &str, value: impl Fn(&str) -> Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value(key) {
        Some(raw) => raw.parse().map_err(|e| {
            ImporterError::Configuration(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ImporterError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            key, raw
        ))),
    }
}
