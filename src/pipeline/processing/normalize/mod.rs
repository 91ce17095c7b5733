//! Provider normalizers turn one raw vendor record into canonical price lines

use pricing_core::{NormalizedPricing, NormalizedRegion, Provider, ServiceMapping};

pub mod normalizers;
pub mod registry;

pub use normalizers::{AwsNormalizer, AzureNormalizer, NormalizerServices, ProviderNormalizer};
pub use registry::NormalizationRegistry;

/// Outcome of normalizing a single raw record
///
/// Skips and errors are counted separately: a skip is an expected gap in
/// reference data or a zero price, an error is bad data.
#[derive(Debug, Clone, Default)]
pub struct NormalizationResult {
    /// At least one canonical record was produced
    pub success: bool,
    pub records: Vec<NormalizedPricing>,
    pub skipped_count: u64,
    pub error_count: u64,
    pub errors: Vec<String>,
}

impl NormalizationResult {
    pub fn skipped(count: u64) -> Self {
        Self {
            skipped_count: count,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_count: 1,
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.errors.push(message.into());
    }

    /// Settle `success` once every line has been handled
    pub fn finish(mut self) -> Self {
        self.success = !self.records.is_empty();
        self
    }
}

/// Reference data resolved once per raw record
#[derive(Debug, Clone)]
pub struct NormalizationContext {
    pub provider: Provider,
    pub service_mapping: ServiceMapping,
    pub normalized_region: NormalizedRegion,
    pub source_raw_id: i64,
    pub collection_id: String,
}
