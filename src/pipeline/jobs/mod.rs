//! Normalization jobs: lifecycle types, batch workers and the controller

use chrono::{DateTime, Utc};
use pricing_core::{Provider, RawRecordFilter};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod batch;
pub mod controller;

pub use batch::{Batch, BatchProcessor, BatchResult};
pub use controller::NormalizationPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    AwsNormalization,
    AzureNormalization,
    FullNormalization,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::AwsNormalization => "aws_normalization",
            JobType::AzureNormalization => "azure_normalization",
            JobType::FullNormalization => "full_normalization",
        }
    }

    /// The single provider a job is scoped to, if any
    pub fn provider(&self) -> Option<Provider> {
        match self {
            JobType::AwsNormalization => Some(Provider::Aws),
            JobType::AzureNormalization => Some(Provider::Azure),
            JobType::FullNormalization => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Pending -> Running -> Completed | Failed | Cancelled`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_records: u64,
    pub processed_records: u64,
    pub normalized_records: u64,
    pub skipped_records: u64,
    pub error_records: u64,
    pub current_stage: String,
    pub last_updated: DateTime<Utc>,
    /// Processed records per second since the job started
    pub rate: f64,
}

impl JobProgress {
    fn new() -> Self {
        Self {
            total_records: 0,
            processed_records: 0,
            normalized_records: 0,
            skipped_records: 0,
            error_records: 0,
            current_stage: "pending".to_string(),
            last_updated: Utc::now(),
            rate: 0.0,
        }
    }

    fn stage(&mut self, stage: &str) {
        self.current_stage = stage.to_string();
        self.last_updated = Utc::now();
    }
}

/// Caller-supplied options. Unset batch size and worker count fall back to
/// the pipeline defaults when the job starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfiguration {
    pub providers: Vec<Provider>,
    pub regions: Vec<String>,
    pub services: Vec<String>,
    pub batch_size: Option<usize>,
    pub concurrent_workers: Option<usize>,
    /// Delete all normalized output before the run
    pub clear_existing: bool,
    /// Normalize and count, never persist
    pub dry_run: bool,
}

impl JobConfiguration {
    pub fn batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or(crate::constants::DEFAULT_BATCH_SIZE)
    }

    pub fn concurrent_workers(&self) -> usize {
        self.concurrent_workers
            .unwrap_or(crate::constants::DEFAULT_CONCURRENT_WORKERS)
    }

    /// Raw-record filter for a job of `job_type`. A provider-scoped job type
    /// wins over the configured provider list.
    pub fn raw_filter(&self, job_type: JobType) -> RawRecordFilter {
        let providers = match job_type.provider() {
            Some(provider) => vec![provider],
            None => self.providers.clone(),
        };
        RawRecordFilter {
            providers,
            regions: self.regions.clone(),
            services: self.services.clone(),
        }
    }
}

/// Snapshot of a normalization job as seen by callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub provider: Option<Provider>,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub configuration: JobConfiguration,
}

impl Job {
    pub(crate) fn new(id: String, job_type: JobType, configuration: JobConfiguration) -> Self {
        Self {
            id,
            job_type,
            provider: job_type.provider(),
            status: JobStatus::Pending,
            progress: JobProgress::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            configuration,
        }
    }

    /// Move to a terminal state. Returns false if the job already reached one.
    pub(crate) fn finish(&mut self, status: JobStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
        self.progress.stage(status.as_str());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = Job::new("j1".to_string(), JobType::FullNormalization, JobConfiguration::default());
        assert!(job.finish(JobStatus::Cancelled, None));
        assert!(!job.finish(JobStatus::Completed, None));
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.progress.current_stage, "cancelled");
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_configuration_defaults() {
        let config = JobConfiguration::default();
        assert_eq!(config.batch_size(), 1000);
        assert_eq!(config.concurrent_workers(), 4);
    }

    #[test]
    fn test_job_type_scopes_provider_filter() {
        let config = JobConfiguration {
            providers: vec![Provider::Azure],
            regions: vec!["eastus".to_string()],
            ..JobConfiguration::default()
        };
        assert_eq!(
            config.raw_filter(JobType::AwsNormalization).providers,
            vec![Provider::Aws]
        );
        let full = config.raw_filter(JobType::FullNormalization);
        assert_eq!(full.providers, vec![Provider::Azure]);
        assert_eq!(full.regions, vec!["eastus".to_string()]);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(
            serde_json::to_string(&JobType::FullNormalization).unwrap(),
            "\"full_normalization\""
        );
    }
}
