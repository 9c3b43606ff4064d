use std::collections::HashMap;
use std::path::Path;

use crate::ImporterError;
use crate::canonical::DistanceRepair;
use crate::sources::{
    FitParser, FitlogParser, GpxParser, KmlParser, LogbookParser, PwxParser, SlfParser,
    TcxParser,
};
use crate::traits::{ParserInstance, ParserOptions};

/// Creators whose TCX exports contain pause markers that are not real pauses.
const TCX_SPURIOUS_PAUSE_CREATORS: &[&str] = &["runtastic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Tcx,
    Gpx,
    Pwx,
    Slf,
    Logbook,
    Logbook3,
    Fitlog,
    Kml,
    Fit,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcx => "tcx",
            Self::Gpx => "gpx",
            Self::Pwx => "pwx",
            Self::Slf => "slf",
            Self::Logbook => "logbook",
            Self::Logbook3 => "logbook3",
            Self::Fitlog => "fitlog",
            Self::Kml => "kml",
            Self::Fit => "fit",
        }
    }

    pub fn all() -> &'static [FileFormat] {
        &[
            Self::Tcx,
            Self::Gpx,
            Self::Pwx,
            Self::Slf,
            Self::Logbook,
            Self::Logbook3,
            Self::Fitlog,
            Self::Kml,
            Self::Fit,
        ]
    }

    fn parse_str(s: &str) -> Result<Self, ImporterError> {
        let normalized = s.trim().trim_start_matches('.').to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|format| format.as_str() == normalized)
            .ok_or_else(|| {
                ImporterError::UnsupportedFormat(format!(
                    "'{}'. Available: {}",
                    s,
                    Self::all()
                        .iter()
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

impl TryFrom<&str> for FileFormat {
    type Error = ImporterError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse_str(value)
    }
}

impl std::str::FromStr for FileFormat {
    type Err = ImporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered format together with the behaviour fixed for it at registration time.
#[derive(Debug, Clone)]
pub struct ParserRegistration {
    pub format: FileFormat,
    pub options: ParserOptions,
}

impl ParserRegistration {
    pub fn new(format: FileFormat, options: ParserOptions) -> Self {
        Self { format, options }
    }

    /// A fresh parser; parsers are single-use.
    pub fn create(&self) -> ParserInstance {
        let options = self.options.clone();
        match self.format {
            FileFormat::Tcx => ParserInstance::Content(Box::new(TcxParser::new(options))),
            FileFormat::Gpx => ParserInstance::Content(Box::new(GpxParser::new(options))),
            FileFormat::Pwx => ParserInstance::Content(Box::new(PwxParser::new(options))),
            FileFormat::Slf => ParserInstance::Content(Box::new(SlfParser::new(options))),
            FileFormat::Logbook | FileFormat::Logbook3 => {
                ParserInstance::Content(Box::new(LogbookParser::new(options)))
            }
            FileFormat::Fitlog => ParserInstance::Content(Box::new(FitlogParser::new(options))),
            FileFormat::Kml => ParserInstance::Content(Box::new(KmlParser::new(options))),
            FileFormat::Fit => ParserInstance::FileName(Box::new(FitParser::new(options))),
        }
    }
}

/// Extension to parser table. The single source of truth for "is this format importable".
pub struct ParserRegistry {
    parsers: HashMap<String, ParserRegistration>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::with_distance_repair(DistanceRepair::default())
    }

    pub fn with_distance_repair(distance_repair: DistanceRepair) -> Self {
        let mut registry = Self {
            parsers: HashMap::new(),
        };

        let defaults = ParserOptions {
            distance_repair,
            ..ParserOptions::default()
        };

        for format in FileFormat::all() {
            let mut options = defaults.clone();
            if *format == FileFormat::Tcx {
                options.spurious_pause_creators = TCX_SPURIOUS_PAUSE_CREATORS
                    .iter()
                    .map(|creator| creator.to_string())
                    .collect();
            }
            registry.register(format.as_str(), ParserRegistration::new(*format, options));
        }

        registry
    }

    pub fn register(&mut self, extension: &str, registration: ParserRegistration) {
        self.parsers.insert(normalize(extension), registration);
    }

    /// `None` for unknown extensions; that is an expected outcome, not an error.
    pub fn resolve(&self, extension: &str) -> Option<&ParserRegistration> {
        self.parsers.get(&normalize(extension))
    }

    pub fn resolve_path(&self, path: &Path) -> Option<&ParserRegistration> {
        extension_of(path).and_then(|ext| self.resolve(&ext))
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.resolve(extension).is_some()
    }

    pub fn list_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.parsers.keys().cloned().collect();
        extensions.sort();
        extensions
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Final suffix of the file name, lowercased. `run.tcx.zip` gives `zip`.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}
