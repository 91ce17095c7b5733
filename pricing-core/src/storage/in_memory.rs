use super::traits::{MappingStore, NormalizedPricingStore, RawPricingStore};
use crate::common::error::{CoreError, Result};
use crate::domain::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// In-memory storage implementation for development/testing
#[derive(Clone)]
pub struct InMemoryStorage {
    raw_records: Arc<Mutex<BTreeMap<i64, RawPricingRecord>>>,
    service_mappings: Arc<Mutex<HashMap<(Provider, String), ServiceMapping>>>,
    regions: Arc<Mutex<Vec<NormalizedRegion>>>,
    normalized: Arc<Mutex<HashMap<Uuid, NormalizedPricing>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| CoreError::Database {
        message: "in-memory storage mutex poisoned".to_string(),
    })
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            raw_records: Arc::new(Mutex::new(BTreeMap::new())),
            service_mappings: Arc::new(Mutex::new(HashMap::new())),
            regions: Arc::new(Mutex::new(Vec::new())),
            normalized: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn add_raw_record(&self, record: RawPricingRecord) -> Result<()> {
        lock(&self.raw_records)?.insert(record.id, record);
        Ok(())
    }

    pub fn add_service_mapping(&self, mapping: ServiceMapping) -> Result<()> {
        let key = (mapping.provider, mapping.vendor_service_name.clone());
        lock(&self.service_mappings)?.insert(key, mapping);
        Ok(())
    }

    pub fn add_region(&self, region: NormalizedRegion) -> Result<()> {
        let mut regions = lock(&self.regions)?;
        regions.retain(|r| r.canonical_code != region.canonical_code);
        regions.push(region);
        Ok(())
    }

    pub fn normalized_len(&self) -> Result<usize> {
        Ok(lock(&self.normalized)?.len())
    }
}

#[async_trait]
impl RawPricingStore for InMemoryStorage {
    async fn count_raw_records(&self, filter: &RawRecordFilter) -> Result<u64> {
        let raw = lock(&self.raw_records)?;
        Ok(raw.values().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn fetch_raw_batch(
        &self,
        filter: &RawRecordFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawPricingRecord>> {
        let raw = lock(&self.raw_records)?;
        Ok(raw
            .values()
            .filter(|r| filter.matches(r))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MappingStore for InMemoryStorage {
    async fn find_service_mapping(
        &self,
        provider: Provider,
        vendor_service_name: &str,
    ) -> Result<Option<ServiceMapping>> {
        let mappings = lock(&self.service_mappings)?;
        Ok(mappings
            .get(&(provider, vendor_service_name.to_string()))
            .cloned())
    }

    async fn find_region(
        &self,
        provider: Provider,
        vendor_region: &str,
    ) -> Result<Option<NormalizedRegion>> {
        let regions = lock(&self.regions)?;
        Ok(regions
            .iter()
            .find(|r| r.vendor_region(provider) == Some(vendor_region))
            .cloned())
    }
}

#[async_trait]
impl NormalizedPricingStore for InMemoryStorage {
    async fn insert_normalized_batch(&self, records: &[NormalizedPricing]) -> Result<usize> {
        let mut normalized = lock(&self.normalized)?;
        for record in records {
            normalized.insert(record.id, record.clone());
        }
        debug!("Inserted {} normalized records", records.len());
        Ok(records.len())
    }

    async fn delete_all_normalized(&self) -> Result<u64> {
        let mut normalized = lock(&self.normalized)?;
        let removed = normalized.len() as u64;
        normalized.clear();
        Ok(removed)
    }

    async fn query_normalized(
        &self,
        filter: &NormalizedPricingFilter,
    ) -> Result<Vec<NormalizedPricing>> {
        let normalized = lock(&self.normalized)?;
        let matching: Vec<NormalizedPricing> = normalized
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(filter.apply_page(matching))
    }

    async fn count_normalized(&self, filter: &NormalizedPricingFilter) -> Result<u64> {
        let normalized = lock(&self.normalized)?;
        Ok(normalized.values().filter(|r| filter.matches(r)).count() as u64)
    }
}
