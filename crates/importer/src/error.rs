use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImporterError>;

#[derive(Error, Debug)]
pub enum ImporterError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Conversion failed: {0}")]
    ConversionFailure(String),

    #[error("Parsing failed: {}", .0.join("; "))]
    ParseFailure(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification used by callers that only need to branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedFormat,
    ConversionFailure,
    ParseFailure,
    IoFailure,
}

impl ImporterError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseFailure(vec![message.into()])
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::ConversionFailure(_) | Self::Archive(_) | Self::Configuration(_) => {
                ErrorKind::ConversionFailure
            }
            Self::ParseFailure(_) | Self::Validation(_) => ErrorKind::ParseFailure,
            Self::Io(_) => ErrorKind::IoFailure,
        }
    }

    /// Human-readable diagnostics, one entry per message collected by a parser.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::ParseFailure(messages) if !messages.is_empty() => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}
