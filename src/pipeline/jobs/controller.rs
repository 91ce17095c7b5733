use chrono::Utc;
use pricing_core::storage::{MappingStore, NormalizedPricingStore, RawPricingStore};
use pricing_core::{NormalizedPricing, NormalizedPricingFilter, RawRecordFilter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::batch::{Batch, BatchProcessor, BatchResult};
use super::{Job, JobConfiguration, JobProgress, JobStatus, JobType};
use crate::config::PipelineDefaults;
use crate::constants::BATCH_CHANNEL_FACTOR;
use crate::error::{EtlError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::{NormalizationRegistry, NormalizerServices};

struct JobEntry {
    job: Job,
    cancel: CancellationToken,
    /// Flips to true once the job's task has fully stopped
    done: watch::Receiver<bool>,
}

/// Runs normalization jobs in the background and keeps their state in memory
///
/// Each job gets one generator paging through raw storage, a pool of workers
/// normalizing batches, and one collector that owns the job's progress
/// counters. Job history does not survive a restart.
#[derive(Clone)]
pub struct NormalizationPipeline {
    raw_store: Arc<dyn RawPricingStore>,
    sink: Arc<dyn NormalizedPricingStore>,
    registry: Arc<NormalizationRegistry>,
    defaults: PipelineDefaults,
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
}

impl NormalizationPipeline {
    pub fn new(
        raw_store: Arc<dyn RawPricingStore>,
        sink: Arc<dyn NormalizedPricingStore>,
        registry: NormalizationRegistry,
        defaults: PipelineDefaults,
    ) -> Self {
        Self {
            raw_store,
            sink,
            registry: Arc::new(registry),
            defaults,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Pipeline whose raw source, mapping tables and sink are all `storage`
    pub fn from_storage<S>(storage: Arc<S>, defaults: PipelineDefaults) -> Self
    where
        S: RawPricingStore + MappingStore + NormalizedPricingStore + 'static,
    {
        let services = NormalizerServices::from_store(storage.clone());
        Self::new(
            storage.clone(),
            storage,
            NormalizationRegistry::with_defaults(services),
            defaults,
        )
    }

    /// Register a job and launch it in the background. Returns the pending job.
    #[instrument(skip(self, configuration), fields(job_type = %job_type))]
    pub async fn start_job(
        &self,
        job_type: JobType,
        mut configuration: JobConfiguration,
    ) -> Result<Job> {
        let batch_size = *configuration
            .batch_size
            .get_or_insert(self.defaults.batch_size);
        let workers = *configuration
            .concurrent_workers
            .get_or_insert(self.defaults.concurrent_workers);
        if batch_size == 0 || workers == 0 {
            return Err(EtlError::Config(
                "batch_size and concurrent_workers must be positive".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), job_type, configuration.clone());
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        self.jobs.write().await.insert(
            id.clone(),
            JobEntry {
                job: job.clone(),
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_job(id, job_type, configuration, cancel).await;
            done_tx.send_replace(true);
        });

        info!(
            job_id = %job.id,
            batch_size,
            workers,
            dry_run = job.configuration.dry_run,
            "Normalization job started"
        );
        Ok(job)
    }

    pub async fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).map(|entry| entry.job.clone())
    }

    /// All known jobs, oldest first
    pub async fn get_all_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by_key(|job| job.started_at);
        jobs
    }

    /// Signal cancellation and mark the job cancelled. Batches already handed
    /// to workers still finish.
    pub async fn cancel_job(&self, id: &str) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| EtlError::JobNotFound(id.to_string()))?;
        if entry.job.status.is_terminal() {
            return Err(EtlError::JobAlreadyFinished {
                id: id.to_string(),
                status: entry.job.status,
            });
        }

        entry.cancel.cancel();
        entry.job.finish(JobStatus::Cancelled, None);
        metrics::jobs::finished(JobStatus::Cancelled.as_str());
        info!(
            job_id = id,
            processed = entry.job.progress.processed_records,
            "Normalization job cancelled"
        );
        Ok(entry.job.clone())
    }

    /// Wait until the job's background task has stopped, then return its final state
    pub async fn wait_for_job(&self, id: &str) -> Result<Job> {
        let mut done = self
            .jobs
            .read()
            .await
            .get(id)
            .map(|entry| entry.done.clone())
            .ok_or_else(|| EtlError::JobNotFound(id.to_string()))?;

        if done.wait_for(|finished| *finished).await.is_err() {
            warn!(job_id = id, "Job task ended without reporting completion");
        }
        self.get_job(id)
            .await
            .ok_or_else(|| EtlError::JobNotFound(id.to_string()))
    }

    pub async fn query_normalized(
        &self,
        filter: &NormalizedPricingFilter,
    ) -> Result<Vec<NormalizedPricing>> {
        Ok(self.sink.query_normalized(filter).await?)
    }

    pub async fn count_normalized(&self, filter: &NormalizedPricingFilter) -> Result<u64> {
        Ok(self.sink.count_normalized(filter).await?)
    }

    async fn run_job(
        &self,
        id: String,
        job_type: JobType,
        configuration: JobConfiguration,
        cancel: CancellationToken,
    ) {
        if !self.mark_running(&id).await {
            debug!(job_id = %id, "Job cancelled before it started");
            return;
        }
        let outcome = self.execute(&id, job_type, &configuration, &cancel).await;
        self.finalize(&id, outcome).await;
    }

    async fn mark_running(&self, id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(entry) if entry.job.status == JobStatus::Pending => {
                entry.job.status = JobStatus::Running;
                entry.job.progress.current_stage = "running".to_string();
                entry.job.progress.last_updated = Utc::now();
                true
            }
            _ => false,
        }
    }

    #[instrument(skip(self, configuration, cancel), fields(job_id = %id))]
    async fn execute(
        &self,
        id: &str,
        job_type: JobType,
        configuration: &JobConfiguration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let filter = configuration.raw_filter(job_type);
        let batch_size = configuration.batch_size();
        let workers = configuration.concurrent_workers();

        self.update_progress(id, |p| p.current_stage = "counting".to_string())
            .await;
        let total = self.raw_store.count_raw_records(&filter).await?;
        self.update_progress(id, |p| p.total_records = total).await;
        info!(total, "Raw records to normalize");

        if configuration.clear_existing && !configuration.dry_run {
            self.update_progress(id, |p| p.current_stage = "clearing".to_string())
                .await;
            let deleted = self.sink.delete_all_normalized().await?;
            info!(deleted, "Cleared existing normalized pricing");
        }

        self.update_progress(id, |p| p.current_stage = "normalizing".to_string())
            .await;

        let capacity = workers * BATCH_CHANNEL_FACTOR;
        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<BatchResult>(capacity);
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let processor = Arc::new(BatchProcessor::new(
            self.registry.clone(),
            self.sink.clone(),
            configuration.dry_run,
        ));

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            pool.spawn(run_worker(
                worker,
                batch_rx.clone(),
                result_tx.clone(),
                processor.clone(),
            ));
        }
        drop(result_tx);

        let collector = tokio::spawn(self.clone().collect(
            id.to_string(),
            result_rx,
            cancel.clone(),
        ));
        let generated = self.generate(&filter, batch_size, batch_tx, cancel).await;

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task aborted");
            }
        }
        let fatal = collector
            .await
            .map_err(|e| EtlError::Pipeline(format!("result collector failed: {e}")))?;

        generated?;
        match fatal {
            Some(message) => Err(EtlError::Pipeline(message)),
            None => Ok(()),
        }
    }

    /// Page through raw storage in offset order, checking for cancellation
    /// between batches only
    async fn generate(
        &self,
        filter: &RawRecordFilter,
        batch_size: usize,
        batches: mpsc::Sender<Batch>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut offset = 0;
        let mut dispatched = 0usize;
        loop {
            if cancel.is_cancelled() {
                info!(offset, dispatched, "Stopping batch generation on cancellation");
                break;
            }

            let records = self
                .raw_store
                .fetch_raw_batch(filter, offset, batch_size)
                .await?;
            if records.is_empty() {
                break;
            }
            let fetched = records.len();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(offset, dispatched, "Dropping undispatched batch on cancellation");
                    break;
                }
                sent = batches.send(Batch { offset, records }) => {
                    if sent.is_err() {
                        warn!(offset, "Batch channel closed early");
                        break;
                    }
                }
            }

            dispatched += 1;
            offset += fetched;
            if fetched < batch_size {
                break;
            }
        }
        debug!(dispatched, "Batch generation finished");
        Ok(())
    }

    /// Sole writer of the running job's counters. Returns the first fatal error.
    async fn collect(
        self,
        id: String,
        mut results: mpsc::Receiver<BatchResult>,
        cancel: CancellationToken,
    ) -> Option<String> {
        let started = Instant::now();
        let mut fatal: Option<String> = None;

        while let Some(result) = results.recv().await {
            if let Some(message) = &result.fatal {
                if fatal.is_none() {
                    error!(job_id = %id, error = %message, "Infrastructure failure, stopping job");
                    fatal = Some(message.clone());
                    cancel.cancel();
                }
            }
            for message in &result.errors {
                debug!(job_id = %id, offset = result.offset, "{}", message);
            }

            let elapsed = started.elapsed().as_secs_f64();
            self.update_progress(&id, |p| {
                p.processed_records += result.processed_records;
                p.normalized_records += result.normalized_records;
                p.skipped_records += result.skipped_records;
                p.error_records += result.error_records;
                p.rate = if elapsed > 0.0 {
                    p.processed_records as f64 / elapsed
                } else {
                    0.0
                };
            })
            .await;
        }
        fatal
    }

    async fn finalize(&self, id: &str, outcome: Result<()>) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(id) else {
            return;
        };
        let job = &mut entry.job;

        let (status, failure) = match outcome {
            Ok(()) => (JobStatus::Completed, None),
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };

        if job.finish(status, failure.clone()) {
            metrics::jobs::finished(status.as_str());
            match failure {
                Some(message) => error!(job_id = id, error = %message, "Normalization job failed"),
                None => info!(
                    job_id = id,
                    processed = job.progress.processed_records,
                    normalized = job.progress.normalized_records,
                    skipped = job.progress.skipped_records,
                    errors = job.progress.error_records,
                    "Normalization job completed"
                ),
            }
        } else {
            if job.error.is_none() {
                job.error = failure;
            }
            info!(
                job_id = id,
                status = %job.status,
                processed = job.progress.processed_records,
                "Normalization job stopped"
            );
        }
    }

    async fn update_progress(&self, id: &str, apply: impl FnOnce(&mut JobProgress)) {
        if let Some(entry) = self.jobs.write().await.get_mut(id) {
            apply(&mut entry.job.progress);
            entry.job.progress.last_updated = Utc::now();
        }
    }
}

async fn run_worker(
    worker: usize,
    batches: Arc<Mutex<mpsc::Receiver<Batch>>>,
    results: mpsc::Sender<BatchResult>,
    processor: Arc<BatchProcessor>,
) {
    loop {
        let next = batches.lock().await.recv().await;
        let Some(batch) = next else {
            break;
        };
        let result = processor.process(batch).await;
        if results.send(result).await.is_err() {
            warn!(worker, "Result channel closed, worker exiting");
            break;
        }
    }
    debug!(worker, "Worker finished");
}
