use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{NormalizedPricing, PricingModel, Provider, RawPricingRecord};

/// Selects which raw rows a normalization job reads. Empty lists match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecordFilter {
    pub providers: Vec<Provider>,
    pub regions: Vec<String>,
    pub services: Vec<String>,
}

impl RawRecordFilter {
    pub fn matches(&self, record: &RawPricingRecord) -> bool {
        let provider_ok = self.providers.is_empty()
            || self
                .providers
                .iter()
                .any(|p| p.as_str().eq_ignore_ascii_case(record.provider.trim()));
        let region_ok = self.regions.is_empty() || self.regions.iter().any(|r| r == &record.region);
        let service_ok =
            self.services.is_empty() || self.services.iter().any(|s| s == &record.service_code);
        provider_ok && region_ok && service_ok
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    PricePerUnit,
    ResourceName,
    ServiceType,
    NormalizedRegion,
    SourceRawId,
}

impl OrderBy {
    pub fn column(&self) -> &'static str {
        match self {
            OrderBy::PricePerUnit => "price_per_unit",
            OrderBy::ResourceName => "resource_name",
            OrderBy::ServiceType => "service_type",
            OrderBy::NormalizedRegion => "normalized_region",
            OrderBy::SourceRawId => "source_raw_id",
        }
    }

    fn compare(&self, a: &NormalizedPricing, b: &NormalizedPricing) -> Ordering {
        match self {
            OrderBy::PricePerUnit => a
                .price_per_unit
                .partial_cmp(&b.price_per_unit)
                .unwrap_or(Ordering::Equal),
            OrderBy::ResourceName => a.resource_name.cmp(&b.resource_name),
            OrderBy::ServiceType => a.service_type.cmp(&b.service_type),
            OrderBy::NormalizedRegion => a.normalized_region.cmp(&b.normalized_region),
            OrderBy::SourceRawId => a.source_raw_id.cmp(&b.source_raw_id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Query over normalized output. Every `None` criterion is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedPricingFilter {
    pub provider: Option<Provider>,
    pub service_category: Option<String>,
    pub service_family: Option<String>,
    pub service_type: Option<String>,
    pub normalized_region: Option<String>,
    pub pricing_model: Option<PricingModel>,
    pub currency: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub vcpu: Option<u32>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: OrderBy,
    pub direction: SortDirection,
}

impl NormalizedPricingFilter {
    pub fn matches(&self, record: &NormalizedPricing) -> bool {
        fn eq_opt(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }

        self.provider.map_or(true, |p| p == record.provider)
            && eq_opt(&self.service_category, &record.service_category)
            && eq_opt(&self.service_family, &record.service_family)
            && eq_opt(&self.service_type, &record.service_type)
            && eq_opt(&self.normalized_region, &record.normalized_region)
            && self.pricing_model.map_or(true, |m| m == record.pricing_model)
            && eq_opt(&self.currency, &record.currency)
            && self.min_price.map_or(true, |min| record.price_per_unit >= min)
            && self.max_price.map_or(true, |max| record.price_per_unit <= max)
            && self
                .vcpu
                .map_or(true, |v| record.resource_specs.vcpu == Some(v))
    }

    /// Sort and page an already-filtered set the way the SQL backend does
    pub fn apply_page(&self, mut records: Vec<NormalizedPricing>) -> Vec<NormalizedPricing> {
        records.sort_by(|a, b| {
            let ord = self.order_by.compare(a, b);
            let ord = match self.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            // ties fall back to id ascending, as in SQL
            ord.then_with(|| a.id.cmp(&b.id))
        });
        let iter = records.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PricingDetails, ResourceSpecs};
    use uuid::Uuid;

    fn priced(id: u128, raw_id: i64, price: f64) -> NormalizedPricing {
        NormalizedPricing {
            id: Uuid::from_u128(id),
            provider: Provider::Azure,
            provider_service_code: "Virtual Machines".to_string(),
            provider_sku: None,
            service_category: "Compute".to_string(),
            service_family: "Virtual Machines".to_string(),
            service_type: "Compute Instance".to_string(),
            normalized_region: "us-east".to_string(),
            provider_region: "eastus".to_string(),
            resource_name: "Standard_D2s_v3".to_string(),
            resource_description: None,
            resource_specs: ResourceSpecs::default(),
            price_per_unit: price,
            unit: "hour".to_string(),
            currency: "USD".to_string(),
            pricing_model: PricingModel::OnDemand,
            pricing_details: PricingDetails::default(),
            effective_date: None,
            minimum_commitment: 0.0,
            source_raw_id: raw_id,
        }
    }

    fn raw(provider: &str, region: &str, service: &str) -> RawPricingRecord {
        RawPricingRecord {
            id: 1,
            provider: provider.to_string(),
            service_code: service.to_string(),
            region: region.to_string(),
            service_family: None,
            payload: "{}".to_string(),
            collection_id: "c1".to_string(),
        }
    }

    #[test]
    fn test_empty_raw_filter_matches_everything() {
        let filter = RawRecordFilter::default();
        assert!(filter.matches(&raw("aws", "us-east-1", "AmazonEC2")));
        assert!(filter.matches(&raw("whatever", "", "")));
    }

    #[test]
    fn test_raw_filter_combines_criteria() {
        let filter = RawRecordFilter {
            providers: vec![Provider::Azure],
            regions: vec!["eastus".to_string()],
            services: vec![],
        };
        assert!(filter.matches(&raw("Azure", "eastus", "Virtual Machines")));
        assert!(!filter.matches(&raw("azure", "westus", "Virtual Machines")));
        assert!(!filter.matches(&raw("aws", "eastus", "AmazonEC2")));
    }

    #[test]
    fn test_tied_prices_page_by_id() {
        let records = vec![
            priced(3, 1, 0.5),
            priced(9, 2, 0.1),
            priced(1, 3, 0.5),
            priced(2, 4, 0.5),
        ];
        let filter = NormalizedPricingFilter {
            direction: SortDirection::Desc,
            limit: Some(2),
            ..NormalizedPricingFilter::default()
        };
        let first_page: Vec<i64> = filter
            .apply_page(records.clone())
            .iter()
            .map(|r| r.source_raw_id)
            .collect();
        assert_eq!(first_page, vec![3, 4]);

        let mut reversed = records;
        reversed.reverse();
        let second_page: Vec<i64> = NormalizedPricingFilter {
            offset: 2,
            ..filter
        }
        .apply_page(reversed)
        .iter()
        .map(|r| r.source_raw_id)
        .collect();
        assert_eq!(second_page, vec![1, 2]);
    }
}
