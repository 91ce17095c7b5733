// Normalization pipeline: per-record processing and job orchestration

pub mod jobs;
pub mod processing;
