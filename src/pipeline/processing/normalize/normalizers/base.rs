use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricing_core::common::error::CoreError;
use pricing_core::storage::MappingStore;
use pricing_core::{
    NormalizedPricing, PricingDetails, PricingModel, Provider, RawPricingRecord, ResourceSpecs,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pipeline::processing::mapping::{
    CachedRegionRepository, CachedServiceMappingRepository, RegionRepository,
    ServiceMappingRepository,
};
use crate::pipeline::processing::normalize::{NormalizationContext, NormalizationResult};
use crate::pipeline::processing::units::{StandardUnitNormalizer, UnitNormalizer};
use crate::pipeline::processing::validation::Validator;

/// Converts one raw record of a single provider into canonical records
#[async_trait]
pub trait ProviderNormalizer: Send + Sync {
    fn provider(&self) -> Provider;

    /// Never fails as a whole: problems are reported through the result counters
    async fn normalize(&self, record: &RawPricingRecord) -> NormalizationResult;
}

/// Collaborators every provider normalizer needs
#[derive(Clone)]
pub struct NormalizerServices {
    pub service_mappings: Arc<dyn ServiceMappingRepository>,
    pub regions: Arc<dyn RegionRepository>,
    pub units: Arc<dyn UnitNormalizer>,
    pub validator: Validator,
}

impl NormalizerServices {
    pub fn new(
        service_mappings: Arc<dyn ServiceMappingRepository>,
        regions: Arc<dyn RegionRepository>,
        units: Arc<dyn UnitNormalizer>,
        validator: Validator,
    ) -> Self {
        Self {
            service_mappings,
            regions,
            units,
            validator,
        }
    }

    /// Cached repositories over `store` with the standard unit tables
    pub fn from_store(store: Arc<dyn MappingStore>) -> Self {
        Self::new(
            Arc::new(CachedServiceMappingRepository::new(store.clone())),
            Arc::new(CachedRegionRepository::new(store)),
            Arc::new(StandardUnitNormalizer::new()),
            Validator::new(),
        )
    }

    /// Input validation shared by every provider. `Some` ends processing of the record.
    pub(crate) fn reject_invalid(&self, record: &RawPricingRecord) -> Option<NormalizationResult> {
        match self.validator.validate_input(record) {
            Ok(()) => None,
            Err(e) => {
                debug!(raw_id = record.id, field = e.field, "Raw record failed validation");
                Some(NormalizationResult::failed(format!("raw record {}: {}", record.id, e)))
            }
        }
    }

    /// Look up the service and region mappings. `Ok(None)` when either is unmapped.
    pub(crate) async fn resolve_context(
        &self,
        provider: Provider,
        vendor_service_name: &str,
        vendor_region: &str,
        record: &RawPricingRecord,
    ) -> Result<Option<NormalizationContext>, CoreError> {
        let Some(service_mapping) = self
            .service_mappings
            .get_service_mapping(provider, vendor_service_name)
            .await?
        else {
            return Ok(None);
        };
        let Some(normalized_region) = self.regions.get_region(provider, vendor_region).await?
        else {
            return Ok(None);
        };
        Ok(Some(NormalizationContext {
            provider,
            service_mapping,
            normalized_region,
            source_raw_id: record.id,
            collection_id: record.collection_id.clone(),
        }))
    }

    /// Canonical unit and the price rescaled to it
    pub(crate) fn canonical_price(&self, provider: Provider, raw_unit: &str, price: f64) -> (String, f64) {
        let unit = self.units.normalize(provider, raw_unit);
        let price = self.units.convert_value(raw_unit, &unit, price);
        (unit, price)
    }

    /// Output-validate `record` and file it under records or errors
    pub(crate) fn accept(&self, result: &mut NormalizationResult, record: NormalizedPricing) {
        match self.validator.validate_output(&record) {
            Ok(()) => result.records.push(record),
            Err(e) => {
                warn!(
                    raw_id = record.source_raw_id,
                    field = e.field,
                    value = %e.value,
                    "Normalized record failed validation"
                );
                result.push_error(format!(
                    "raw record {} ({}): {}",
                    record.source_raw_id, record.resource_name, e
                ));
            }
        }
    }
}

/// The resolved context, or the result to return when it could not be resolved
pub(crate) fn settle_context(
    record: &RawPricingRecord,
    lookup: Result<Option<NormalizationContext>, CoreError>,
) -> std::result::Result<NormalizationContext, NormalizationResult> {
    match lookup {
        Ok(Some(ctx)) => Ok(ctx),
        Ok(None) => {
            debug!(
                raw_id = record.id,
                service = %record.service_code,
                region = %record.region,
                "No canonical mapping, skipping"
            );
            Err(NormalizationResult::skipped(1))
        }
        Err(e) => Err(NormalizationResult::failed(format!(
            "raw record {}: mapping lookup failed: {}",
            record.id, e
        ))),
    }
}

/// One priced line before it is stamped with context
#[derive(Debug, Clone)]
pub(crate) struct PriceLine {
    /// Stable within the raw record, feeds the record id
    pub line_key: String,
    pub provider_sku: Option<String>,
    pub resource_name: String,
    pub resource_description: Option<String>,
    pub resource_specs: ResourceSpecs,
    pub price_per_unit: f64,
    pub unit: String,
    pub currency: String,
    pub pricing_model: PricingModel,
    pub pricing_details: PricingDetails,
    pub effective_date: Option<DateTime<Utc>>,
    pub minimum_commitment: f64,
}

pub(crate) fn build_record(
    ctx: &NormalizationContext,
    provider_service_code: &str,
    provider_region: &str,
    line: PriceLine,
) -> NormalizedPricing {
    NormalizedPricing {
        id: record_id(ctx.provider, ctx.source_raw_id, &line.line_key),
        provider: ctx.provider,
        provider_service_code: provider_service_code.to_string(),
        provider_sku: line.provider_sku,
        service_category: ctx.service_mapping.service_category.clone(),
        service_family: ctx.service_mapping.service_family.clone(),
        service_type: ctx.service_mapping.canonical_service_type.clone(),
        normalized_region: ctx.normalized_region.canonical_code.clone(),
        provider_region: provider_region.to_string(),
        resource_name: line.resource_name,
        resource_description: line.resource_description,
        resource_specs: line.resource_specs,
        price_per_unit: line.price_per_unit,
        unit: line.unit,
        currency: line.currency,
        pricing_model: line.pricing_model,
        pricing_details: line.pricing_details,
        effective_date: line.effective_date,
        minimum_commitment: line.minimum_commitment,
        source_raw_id: ctx.source_raw_id,
    }
}

/// Deterministic id: the same raw line always maps to the same canonical row
pub fn record_id(provider: Provider, source_raw_id: i64, line_key: &str) -> Uuid {
    let name = format!("{}:{}:{}", provider, source_raw_id, line_key);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

pub(crate) fn parse_effective_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Trimmed, non-empty string or `None`
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
