pub mod canonical;
pub mod config;
pub mod converters;
pub mod error;
pub mod importer;
pub mod registry;
pub mod result;
pub mod sources;
pub mod sport_mapper;
pub mod traits;

pub use canonical::{ActivityDataContainer, DistanceRepair};
pub use config::ImporterConfig;
pub use error::{ErrorKind, ImporterError, Result};
pub use importer::FileImporter;
pub use registry::{FileFormat, ParserRegistry};
pub use result::{BatchStatus, ImportResult, ImportResultSet};
pub use sport_mapper::{CommonSportMapper, Sport};
pub use traits::{FileContentAwareParser, FileNameAwareParser, FormatParser, ParserOptions};
