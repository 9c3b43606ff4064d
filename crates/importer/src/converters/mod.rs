mod archive;
mod kmz;
mod ttbin;

pub use self::archive::ZipExpander;
pub use self::kmz::KmzConverter;
pub use self::ttbin::TtbinConverter;

#[cfg(test)]
pub(crate) use self::archive::tests::write_zip;

use crate::{ImporterError, Result};
use std::path::{Path, PathBuf};

/// Guards for archive expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: 512 * 1024 * 1024,
        }
    }
}

impl ExtractionLimits {
    pub fn budget(&self) -> ExtractionBudget {
        ExtractionBudget::new(self.max_bytes)
    }
}

/// Bytes that may still be written while resolving one submitted file. Every expansion and
/// conversion below that file draws from the same budget, however deeply it is nested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionBudget {
    limit: u64,
    used: u64,
}

impl ExtractionBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Books `bytes` written on behalf of `source`.
    pub fn charge(&mut self, bytes: u64, source: &Path) -> Result<()> {
        if bytes > self.remaining() {
            return Err(self.exceeded(source));
        }
        self.used += bytes;
        Ok(())
    }

    pub fn exceeded(&self, source: &Path) -> ImporterError {
        ImporterError::ConversionFailure(format!(
            "{} expands to more than {} bytes",
            source.display(),
            self.limit
        ))
    }
}

/// Turns one non-native file into one or more natively parseable files.
///
/// Outputs are written below `workdir`, which the caller owns and removes.
pub trait FileTypeConverter {
    fn convertible_extension(&self) -> &'static str;

    fn convert(
        &self,
        path: &Path,
        workdir: &Path,
        budget: &mut ExtractionBudget,
    ) -> Result<Vec<PathBuf>>;
}

/// Extracts the members of an archive; each member goes through resolution again.
pub trait ArchiveExpander {
    fn archive_extension(&self) -> &'static str;

    fn expand(
        &self,
        path: &Path,
        workdir: &Path,
        budget: &mut ExtractionBudget,
    ) -> Result<Vec<PathBuf>>;
}
