pub mod pipeline;
pub mod staging;

pub use pipeline::{
    RelayError, RelayPipeline, RelayRequest, RelayRoute, RelaySource, RelaySummary,
    DEFAULT_MAX_FILE_SIZE,
};
pub use staging::{StagedFile, StagingError, TempStaging, STAGING_PREFIX};
