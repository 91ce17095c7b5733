//! Metrics for the normalization pipeline
//!
//! Library code only records through the `metrics` facade. Whether anything is
//! exported depends on the recorder the binary installs.

use std::fmt;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    NormalizeRecordsNormalized,
    NormalizeRecordsSkipped,
    NormalizeRecordsErrored,
    NormalizeValidationFailures,
    BatchesProcessed,
    BatchDuration,
    BatchInsertFailures,
    JobsFinished,
    MappingCacheHits,
    MappingCacheMisses,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::NormalizeRecordsNormalized => "pricing_normalize_records_total",
            MetricName::NormalizeRecordsSkipped => "pricing_normalize_skipped_total",
            MetricName::NormalizeRecordsErrored => "pricing_normalize_errors_total",
            MetricName::NormalizeValidationFailures => "pricing_normalize_validation_failures_total",
            MetricName::BatchesProcessed => "pricing_batches_processed_total",
            MetricName::BatchDuration => "pricing_batch_duration_seconds",
            MetricName::BatchInsertFailures => "pricing_batch_insert_failures_total",
            MetricName::JobsFinished => "pricing_jobs_total",
            MetricName::MappingCacheHits => "pricing_mapping_cache_hits_total",
            MetricName::MappingCacheMisses => "pricing_mapping_cache_misses_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus exporter listening on `addr`
pub fn init_metrics(addr: &str) {
    let addr: SocketAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address '{}': {}", addr, e);
            return;
        }
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn records_normalized(provider: &'static str, count: u64) {
        ::metrics::counter!(MetricName::NormalizeRecordsNormalized.as_str(), "provider" => provider)
            .increment(count);
    }

    pub fn records_skipped(provider: &'static str, count: u64) {
        ::metrics::counter!(MetricName::NormalizeRecordsSkipped.as_str(), "provider" => provider)
            .increment(count);
    }

    pub fn records_errored(provider: &'static str, count: u64) {
        ::metrics::counter!(MetricName::NormalizeRecordsErrored.as_str(), "provider" => provider)
            .increment(count);
    }

    pub fn validation_failed(field: &'static str) {
        ::metrics::counter!(MetricName::NormalizeValidationFailures.as_str(), "field" => field)
            .increment(1);
    }
}

pub mod batch {
    use super::MetricName;

    pub fn processed(secs: f64) {
        ::metrics::counter!(MetricName::BatchesProcessed.as_str()).increment(1);
        ::metrics::histogram!(MetricName::BatchDuration.as_str()).record(secs);
    }

    pub fn insert_failed() {
        ::metrics::counter!(MetricName::BatchInsertFailures.as_str()).increment(1);
    }
}

pub mod jobs {
    use super::MetricName;

    pub fn finished(status: &'static str) {
        ::metrics::counter!(MetricName::JobsFinished.as_str(), "status" => status).increment(1);
    }
}

pub mod mapping {
    use super::MetricName;

    pub fn cache_hit(kind: &'static str) {
        ::metrics::counter!(MetricName::MappingCacheHits.as_str(), "kind" => kind).increment(1);
    }

    pub fn cache_miss(kind: &'static str) {
        ::metrics::counter!(MetricName::MappingCacheMisses.as_str(), "kind" => kind).increment(1);
    }
}
