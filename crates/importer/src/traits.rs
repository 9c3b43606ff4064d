use crate::Result;
use crate::canonical::{ActivityDataContainer, DistanceRepair};
use std::path::Path;

/// Per-format behaviour fixed when the format is registered.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub distance_repair: DistanceRepair,
    pub detect_pauses: bool,
    /// Creators known to write pause markers that are not real pauses (matched by prefix,
    /// case-insensitive). Pause detection is switched off for their files.
    pub spurious_pause_creators: Vec<String>,
}

impl ParserOptions {
    pub fn detects_pauses_for(&self, creator: Option<&str>) -> bool {
        if !self.detect_pauses {
            return false;
        }

        let Some(creator) = creator else {
            return true;
        };
        let creator = creator.trim().to_lowercase();

        !self
            .spurious_pause_creators
            .iter()
            .any(|source| creator.starts_with(&source.to_lowercase()))
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            distance_repair: DistanceRepair::default(),
            detect_pauses: true,
            spurious_pause_creators: Vec::new(),
        }
    }
}

/// What a parser produced: containers in source order, or the reasons it failed.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    activities: Vec<ActivityDataContainer>,
    errors: Vec<String>,
}

impl ParseOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        let mut outcome = Self::default();
        outcome.add_error(message);
        outcome
    }

    pub fn add_activity(&mut self, container: ActivityDataContainer) {
        self.activities.push(container);
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Stores the result of a parse run. A failed run keeps no containers.
    pub fn record(&mut self, result: Result<Vec<ActivityDataContainer>>) {
        match result {
            Ok(activities) => self.activities.extend(activities),
            Err(e) => {
                self.activities.clear();
                self.errors.extend(e.messages());
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn activities(&self) -> &[ActivityDataContainer] {
        if self.is_failed() { &[] } else { &self.activities }
    }

    pub fn into_activities(self) -> Vec<ActivityDataContainer> {
        if self.is_failed() {
            Vec::new()
        } else {
            self.activities
        }
    }
}

/// Shared read side of every format parser.
pub trait FormatParser {
    fn format_name(&self) -> &'static str;

    fn outcome(&self) -> &ParseOutcome;

    fn into_outcome(self: Box<Self>) -> ParseOutcome;

    fn failed(&self) -> bool {
        self.outcome().is_failed()
    }

    fn errors(&self) -> &[String] {
        self.outcome().errors()
    }

    fn activity_count(&self) -> usize {
        self.outcome().activities().len()
    }

    fn activity_at(&self, index: usize) -> Option<&ActivityDataContainer> {
        self.outcome().activities().get(index)
    }

    fn has_multiple_activities(&self) -> bool {
        self.activity_count() > 1
    }
}

/// Parsers that work on the raw file bytes.
pub trait FileContentAwareParser: FormatParser {
    fn parse_content(&mut self, content: &[u8]);
}

/// Parsers that need to open the file themselves.
pub trait FileNameAwareParser: FormatParser {
    fn parse_file(&mut self, path: &Path);
}

/// A freshly created parser together with the one input mode it supports.
pub enum ParserInstance {
    Content(Box<dyn FileContentAwareParser>),
    FileName(Box<dyn FileNameAwareParser>),
}

impl ParserInstance {
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::Content(parser) => parser.format_name(),
            Self::FileName(parser) => parser.format_name(),
        }
    }

    pub fn parse(self, path: &Path) -> ParseOutcome {
        match self {
            Self::Content(mut parser) => match std::fs::read(path) {
                Ok(content) => {
                    parser.parse_content(&content);
                    parser.into_outcome()
                }
                Err(e) => ParseOutcome::failed(format!(
                    "Cannot read {}: {}",
                    path.display(),
                    e
                )),
            },
            Self::FileName(mut parser) => {
                parser.parse_file(path);
                parser.into_outcome()
            }
        }
    }
}
