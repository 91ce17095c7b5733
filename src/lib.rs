pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;

pub use error::{EtlError, Result};
pub use pipeline::jobs::{Job, JobConfiguration, JobStatus, JobType, NormalizationPipeline};
