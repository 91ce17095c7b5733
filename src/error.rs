use pricing_core::common::error::CoreError;
use thiserror::Error;

use crate::pipeline::jobs::JobStatus;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Storage error: {0}")]
    Core(#[from] CoreError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} already finished with status {status}")]
    JobAlreadyFinished { id: String, status: JobStatus },
}

pub type Result<T> = std::result::Result<T, EtlError>;
