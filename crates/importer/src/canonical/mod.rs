pub mod builder;
pub mod models;
pub mod reconcile;
pub mod validator;

pub use builder::{ActivityClock, ContinuousDataBuilder, Sample};
pub use models::{ActivityData, ActivityDataContainer, ContinuousData, Metadata, Pause, Round};
pub use reconcile::DistanceRepair;
pub use validator::{ActivityValidator, ValidationReport};
