use pricing_core::storage::NormalizedPricingStore;
use pricing_core::{Provider, RawPricingRecord};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::observability::metrics;
use crate::pipeline::processing::normalize::NormalizationRegistry;

/// One page of raw records, processed as a unit by a single worker
#[derive(Debug, Clone)]
pub struct Batch {
    pub offset: usize,
    pub records: Vec<RawPricingRecord>,
}

/// Per-batch tally handed from a worker to the collector
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub offset: usize,
    pub processed_records: u64,
    pub normalized_records: u64,
    pub skipped_records: u64,
    pub error_records: u64,
    pub errors: Vec<String>,
    /// Infrastructure failure that must fail the job
    pub fatal: Option<String>,
}

/// Normalizes a batch record by record and persists the output in one insert
pub struct BatchProcessor {
    registry: Arc<NormalizationRegistry>,
    sink: Arc<dyn NormalizedPricingStore>,
    dry_run: bool,
}

impl BatchProcessor {
    pub fn new(
        registry: Arc<NormalizationRegistry>,
        sink: Arc<dyn NormalizedPricingStore>,
        dry_run: bool,
    ) -> Self {
        Self {
            registry,
            sink,
            dry_run,
        }
    }

    #[instrument(skip_all, fields(offset = batch.offset, size = batch.records.len()))]
    pub async fn process(&self, batch: Batch) -> BatchResult {
        let started = Instant::now();
        let mut result = BatchResult {
            offset: batch.offset,
            processed_records: batch.records.len() as u64,
            ..BatchResult::default()
        };
        let mut normalized = Vec::new();

        for record in &batch.records {
            let normalizer = record
                .provider
                .parse::<Provider>()
                .ok()
                .and_then(|provider| self.registry.get(provider));
            let Some(normalizer) = normalizer else {
                result.error_records += 1;
                result.errors.push(format!(
                    "raw record {}: no normalizer for provider '{}'",
                    record.id, record.provider
                ));
                continue;
            };

            let outcome = normalizer.normalize(record).await;
            let provider = normalizer.provider().as_str();
            metrics::normalize::records_normalized(provider, outcome.records.len() as u64);
            metrics::normalize::records_skipped(provider, outcome.skipped_count);
            metrics::normalize::records_errored(provider, outcome.error_count);

            result.skipped_records += outcome.skipped_count;
            result.error_records += outcome.error_count;
            result.errors.extend(outcome.errors);
            normalized.extend(outcome.records);
        }

        if !self.dry_run && !normalized.is_empty() {
            if let Err(e) = self.sink.insert_normalized_batch(&normalized).await {
                error!(offset = batch.offset, error = %e, "Bulk insert failed");
                metrics::batch::insert_failed();
                result.fatal = Some(format!("bulk insert at offset {} failed: {}", batch.offset, e));
                normalized.clear();
            }
        }
        result.normalized_records = normalized.len() as u64;

        metrics::batch::processed(started.elapsed().as_secs_f64());
        debug!(
            normalized = result.normalized_records,
            skipped = result.skipped_records,
            errors = result.error_records,
            "Batch done"
        );
        result
    }
}
