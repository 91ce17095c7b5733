use crate::common::error::Result;
use crate::domain::*;
use async_trait::async_trait;

/// Read side of the raw collection tables
#[async_trait]
pub trait RawPricingStore: Send + Sync {
    async fn count_raw_records(&self, filter: &RawRecordFilter) -> Result<u64>;

    /// One page of raw rows ordered by id
    async fn fetch_raw_batch(
        &self,
        filter: &RawRecordFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawPricingRecord>>;
}

/// Static reference data that maps vendor names onto the canonical vocabulary
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn find_service_mapping(
        &self,
        provider: Provider,
        vendor_service_name: &str,
    ) -> Result<Option<ServiceMapping>>;

    async fn find_region(
        &self,
        provider: Provider,
        vendor_region: &str,
    ) -> Result<Option<NormalizedRegion>>;
}

/// Sink and query surface for canonical pricing
#[async_trait]
pub trait NormalizedPricingStore: Send + Sync {
    /// Persist all records atomically. Records are upserted by id.
    async fn insert_normalized_batch(&self, records: &[NormalizedPricing]) -> Result<usize>;
    async fn delete_all_normalized(&self) -> Result<u64>;
    async fn query_normalized(
        &self,
        filter: &NormalizedPricingFilter,
    ) -> Result<Vec<NormalizedPricing>>;
    /// Count matches, ignoring the filter's paging fields
    async fn count_normalized(&self, filter: &NormalizedPricingFilter) -> Result<u64>;
}
