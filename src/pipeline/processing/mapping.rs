//! Read-through caches over the static mapping tables
//!
//! Only hits are cached. An absent mapping is asked for again on the next
//! lookup, so rows added to the reference tables show up without a restart.

use async_trait::async_trait;
use pricing_core::common::error::Result;
use pricing_core::storage::MappingStore;
use pricing_core::{NormalizedRegion, Provider, ServiceMapping};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::observability::metrics;

#[async_trait]
pub trait ServiceMappingRepository: Send + Sync {
    /// `Ok(None)` means the vendor service is intentionally unmapped
    async fn get_service_mapping(
        &self,
        provider: Provider,
        vendor_service_name: &str,
    ) -> Result<Option<ServiceMapping>>;
}

#[async_trait]
pub trait RegionRepository: Send + Sync {
    /// `Ok(None)` means the vendor region has no canonical equivalent yet
    async fn get_region(
        &self,
        provider: Provider,
        vendor_region: &str,
    ) -> Result<Option<NormalizedRegion>>;
}

type CacheKey = (Provider, String);

/// Positive-only cache. Two tasks racing on the same cold key both hit the
/// store and write the same value.
struct PositiveCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> PositiveCache<K, V> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn insert(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, value);
        }
    }

    fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

pub struct CachedServiceMappingRepository {
    store: Arc<dyn MappingStore>,
    cache: PositiveCache<CacheKey, ServiceMapping>,
}

impl CachedServiceMappingRepository {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self {
            store,
            cache: PositiveCache::new(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl ServiceMappingRepository for CachedServiceMappingRepository {
    async fn get_service_mapping(
        &self,
        provider: Provider,
        vendor_service_name: &str,
    ) -> Result<Option<ServiceMapping>> {
        let key = (provider, vendor_service_name.to_string());
        if let Some(mapping) = self.cache.get(&key) {
            metrics::mapping::cache_hit("service");
            return Ok(Some(mapping));
        }
        metrics::mapping::cache_miss("service");

        let found = self
            .store
            .find_service_mapping(provider, vendor_service_name)
            .await?;
        match &found {
            Some(mapping) => self.cache.insert(key, mapping.clone()),
            None => debug!(%provider, service = vendor_service_name, "No service mapping"),
        }
        Ok(found)
    }
}

pub struct CachedRegionRepository {
    store: Arc<dyn MappingStore>,
    cache: PositiveCache<CacheKey, NormalizedRegion>,
}

impl CachedRegionRepository {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self {
            store,
            cache: PositiveCache::new(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl RegionRepository for CachedRegionRepository {
    async fn get_region(
        &self,
        provider: Provider,
        vendor_region: &str,
    ) -> Result<Option<NormalizedRegion>> {
        let key = (provider, vendor_region.to_string());
        if let Some(region) = self.cache.get(&key) {
            metrics::mapping::cache_hit("region");
            return Ok(Some(region));
        }
        metrics::mapping::cache_miss("region");

        let found = self.store.find_region(provider, vendor_region).await?;
        match &found {
            Some(region) => self.cache.insert(key, region.clone()),
            None => debug!(%provider, region = vendor_region, "No region mapping"),
        }
        Ok(found)
    }
}
