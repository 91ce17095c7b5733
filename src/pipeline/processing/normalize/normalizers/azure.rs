use async_trait::async_trait;
use once_cell::sync::Lazy;
use pricing_core::{PricingDetails, PricingModel, Provider, RawPricingRecord};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::base::{
    build_record, non_empty, parse_effective_date, settle_context, NormalizerServices, PriceLine,
    ProviderNormalizer,
};
use crate::pipeline::processing::normalize::{NormalizationContext, NormalizationResult};
use crate::pipeline::processing::specs::{extract_specs, Attributes};

static STORAGE_TIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(hot|cool|archive)\b").expect("storage tier pattern"));

/// One item of the Azure Retail Prices API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureRetailPrice {
    currency_code: String,
    unit_of_measure: String,
    service_name: String,
    product_name: String,
    sku_name: String,
    meter_name: String,
    #[serde(default)]
    retail_price: f64,
    #[serde(default)]
    tier_minimum_units: f64,
    #[serde(default)]
    arm_region_name: Option<String>,
    #[serde(default)]
    arm_sku_name: Option<String>,
    #[serde(default)]
    effective_start_date: Option<String>,
    #[serde(default)]
    meter_id: Option<String>,
    #[serde(default)]
    sku_id: Option<String>,
    #[serde(default, rename = "type")]
    price_type: Option<String>,
    #[serde(default)]
    reservation_term: Option<String>,
}

impl AzureRetailPrice {
    fn missing_required_field(&self) -> Option<&'static str> {
        [
            ("currencyCode", &self.currency_code),
            ("unitOfMeasure", &self.unit_of_measure),
            ("serviceName", &self.service_name),
            ("productName", &self.product_name),
            ("skuName", &self.sku_name),
            ("meterName", &self.meter_name),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }

    fn spec_attributes(&self) -> Attributes {
        [
            ("armSkuName", self.arm_sku_name.as_deref()),
            ("skuName", Some(self.sku_name.as_str())),
            ("meterName", Some(self.meter_name.as_str())),
            ("productName", Some(self.product_name.as_str())),
        ]
        .into_iter()
        .filter_map(|(key, value)| non_empty(value).map(|v| (key.to_string(), v.to_string())))
        .collect()
    }

    fn line_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.meter_id.as_deref().unwrap_or_default(),
            self.sku_id.as_deref().unwrap_or(&self.sku_name),
            self.price_type.as_deref().unwrap_or_default(),
            self.reservation_term.as_deref().unwrap_or_default(),
            self.tier_minimum_units
        )
    }
}

pub struct AzureNormalizer {
    services: NormalizerServices,
}

impl AzureNormalizer {
    pub fn new(services: NormalizerServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ProviderNormalizer for AzureNormalizer {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    #[instrument(skip(self, record), fields(raw_id = record.id))]
    async fn normalize(&self, record: &RawPricingRecord) -> NormalizationResult {
        if let Some(rejected) = self.services.reject_invalid(record) {
            return rejected;
        }

        let item: AzureRetailPrice = match serde_json::from_str(&record.payload) {
            Ok(item) => item,
            Err(e) => {
                return NormalizationResult::failed(format!(
                    "raw record {}: not an Azure retail price item: {}",
                    record.id, e
                ))
            }
        };
        if let Some(field) = item.missing_required_field() {
            return NormalizationResult::failed(format!(
                "raw record {}: required field '{}' is empty",
                record.id, field
            ));
        }

        let region = non_empty(item.arm_region_name.as_deref()).unwrap_or(&record.region);
        let lookup = self
            .services
            .resolve_context(Provider::Azure, &item.service_name, region, record)
            .await;
        let ctx = match settle_context(record, lookup) {
            Ok(ctx) => ctx,
            Err(result) => return result,
        };

        let price = item.retail_price;
        if price == 0.0 {
            debug!("Zero retail price, skipping");
            return NormalizationResult::skipped(1);
        }

        let (unit, price_per_unit) =
            self.services
                .canonical_price(Provider::Azure, &item.unit_of_measure, price);
        let (pricing_model, pricing_details) = classify(&item, price);
        let line = PriceLine {
            line_key: item.line_key(),
            provider_sku: non_empty(item.sku_id.as_deref())
                .or(non_empty(item.arm_sku_name.as_deref()))
                .map(str::to_string),
            resource_name: resource_name(&ctx, &item),
            resource_description: Some(format!("{} {}", item.product_name, item.meter_name)),
            resource_specs: extract_specs(
                Provider::Azure,
                &ctx.service_mapping.canonical_service_type,
                &item.spec_attributes(),
            ),
            price_per_unit,
            unit,
            currency: item.currency_code.trim().to_string(),
            pricing_model,
            pricing_details,
            effective_date: parse_effective_date(item.effective_start_date.as_deref()),
            minimum_commitment: item.tier_minimum_units,
        };

        let mut result = NormalizationResult::default();
        let normalized = build_record(&ctx, &record.service_code, region, line);
        self.services.accept(&mut result, normalized);
        result.finish()
    }
}

/// Pricing model from the price type and the product, SKU and meter names
fn classify(item: &AzureRetailPrice, price: f64) -> (PricingModel, PricingDetails) {
    let names = format!(
        "{} {} {}",
        item.product_name, item.sku_name, item.meter_name
    )
    .to_lowercase();
    let price_type = item.price_type.as_deref().unwrap_or_default().to_lowercase();
    let term = non_empty(item.reservation_term.as_deref());
    let three_year = term.is_some_and(|t| t.starts_with('3')) || names.contains("3 year");
    let term_length = term
        .map(str::to_string)
        .or_else(|| Some(if three_year { "3 Years" } else { "1 Year" }.to_string()));

    if price_type == "reservation" || names.contains("reserved") {
        let model = if three_year {
            PricingModel::Reserved3Yr
        } else {
            PricingModel::Reserved1Yr
        };
        let details = PricingDetails {
            term_length,
            payment_option: Some("Upfront".to_string()),
            upfront_cost: Some(price),
            ..PricingDetails::default()
        };
        return (model, details);
    }

    if price_type.replace(' ', "") == "savingsplan" || names.contains("savings plan") {
        let details = PricingDetails {
            term_length,
            hourly_rate: Some(price),
            ..PricingDetails::default()
        };
        return (PricingModel::SavingsPlan, details);
    }

    if names.contains("spot") || names.contains("low priority") {
        return (PricingModel::Spot, PricingDetails::default());
    }

    (PricingModel::OnDemand, PricingDetails::default())
}

fn resource_name(ctx: &NormalizationContext, item: &AzureRetailPrice) -> String {
    let service_type = ctx.service_mapping.canonical_service_type.to_lowercase();
    if item.service_name == "Storage" || service_type.contains("storage") {
        let names = format!("{} {}", item.sku_name, item.meter_name);
        if let Some(tier) = STORAGE_TIER_RE.captures(&names) {
            let tier = tier[1].to_lowercase();
            let mut chars = tier.chars();
            if let Some(first) = chars.next() {
                return format!("{}{} Storage", first.to_ascii_uppercase(), chars.as_str());
            }
        }
    }

    if let Some(arm_sku) = non_empty(item.arm_sku_name.as_deref()) {
        return arm_sku.to_string();
    }
    if item.product_name.contains(&item.sku_name) {
        item.product_name.clone()
    } else {
        format!("{} {}", item.product_name, item.sku_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricing_core::storage::InMemoryStorage;
    use pricing_core::{NormalizedRegion, ServiceMapping};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn normalizer() -> AzureNormalizer {
        let storage = InMemoryStorage::new();
        for (name, service_type, category, family) in [
            ("Virtual Machines", "Compute Instance", "Compute", "Virtual Machines"),
            ("Storage", "Object Storage", "Storage", "Blob Storage"),
        ] {
            storage
                .add_service_mapping(ServiceMapping {
                    provider: Provider::Azure,
                    vendor_service_name: name.to_string(),
                    vendor_service_code: None,
                    canonical_service_type: service_type.to_string(),
                    service_category: category.to_string(),
                    service_family: family.to_string(),
                })
                .unwrap();
        }
        storage
            .add_region(NormalizedRegion {
                canonical_code: "us-east".to_string(),
                aws_region: Some("us-east-1".to_string()),
                azure_region: Some("eastus".to_string()),
                display_name: "US East".to_string(),
                country: Some("US".to_string()),
                continent: Some("North America".to_string()),
            })
            .unwrap();
        AzureNormalizer::new(NormalizerServices::from_store(Arc::new(storage)))
    }

    fn vm_item() -> Value {
        json!({
            "currencyCode": "USD",
            "tierMinimumUnits": 0.0,
            "retailPrice": 0.096,
            "unitPrice": 0.096,
            "armRegionName": "eastus",
            "location": "US East",
            "effectiveStartDate": "2020-08-01T00:00:00Z",
            "meterId": "meter-d2s",
            "meterName": "D2s v3",
            "productId": "DZH318Z0BQ4L",
            "skuId": "DZH318Z0BQ4L/00Q8",
            "productName": "Virtual Machines Dsv3 Series",
            "skuName": "D2s v3",
            "serviceName": "Virtual Machines",
            "serviceFamily": "Compute",
            "unitOfMeasure": "1 Hour",
            "type": "Consumption",
            "armSkuName": "Standard_D2s_v3"
        })
    }

    fn with(mut item: Value, changes: Value) -> Value {
        if let (Some(target), Some(changes)) = (item.as_object_mut(), changes.as_object()) {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
        }
        item
    }

    fn raw(id: i64, payload: Value) -> RawPricingRecord {
        RawPricingRecord {
            id,
            provider: "azure".to_string(),
            service_code: "Virtual Machines".to_string(),
            region: "eastus".to_string(),
            service_family: Some("Compute".to_string()),
            payload: payload.to_string(),
            collection_id: "collection-2".to_string(),
        }
    }

    #[tokio::test]
    async fn test_on_demand_vm() {
        let result = normalizer().normalize(&raw(1, vm_item())).await;

        assert!(result.success);
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.resource_name, "Standard_D2s_v3");
        assert_eq!(record.pricing_model, PricingModel::OnDemand);
        assert_eq!(record.unit, "hour");
        assert_eq!(record.currency, "USD");
        assert_eq!(record.provider_region, "eastus");
        assert_eq!(record.normalized_region, "us-east");
        assert_eq!(record.provider_sku.as_deref(), Some("DZH318Z0BQ4L/00Q8"));
        assert_eq!(record.resource_specs.vcpu, Some(2));
        assert_eq!(record.resource_specs.memory_gb, Some(8.0));
        assert_eq!(record.resource_specs.storage_type.as_deref(), Some("Premium SSD"));
        assert!(record.effective_date.is_some());
    }

    #[tokio::test]
    async fn test_spot_and_low_priority() {
        let spot = normalizer()
            .normalize(&raw(2, with(vm_item(), json!({ "skuName": "D2s v3 Spot", "retailPrice": 0.02 }))))
            .await;
        assert_eq!(spot.records[0].pricing_model, PricingModel::Spot);

        let low = normalizer()
            .normalize(&raw(3, with(vm_item(), json!({ "meterName": "D2s v3 Low Priority" }))))
            .await;
        assert_eq!(low.records[0].pricing_model, PricingModel::Spot);
    }

    #[tokio::test]
    async fn test_reservation_terms() {
        let one_year = normalizer()
            .normalize(&raw(
                4,
                with(vm_item(), json!({ "type": "Reservation", "reservationTerm": "1 Year", "retailPrice": 500.0 })),
            ))
            .await;
        let record = &one_year.records[0];
        assert_eq!(record.pricing_model, PricingModel::Reserved1Yr);
        assert_eq!(record.pricing_details.term_length.as_deref(), Some("1 Year"));
        assert_eq!(record.pricing_details.upfront_cost, Some(500.0));

        let three_year = normalizer()
            .normalize(&raw(
                5,
                with(vm_item(), json!({ "productName": "Virtual Machines Dsv3 Series Reserved 3 Year" })),
            ))
            .await;
        assert_eq!(three_year.records[0].pricing_model, PricingModel::Reserved3Yr);
    }

    #[tokio::test]
    async fn test_savings_plan() {
        let result = normalizer()
            .normalize(&raw(6, with(vm_item(), json!({ "type": "SavingsPlan" }))))
            .await;
        assert_eq!(result.records[0].pricing_model, PricingModel::SavingsPlan);
        assert_eq!(result.records[0].pricing_details.hourly_rate, Some(0.096));
    }

    #[tokio::test]
    async fn test_storage_tier_naming() {
        let item = with(
            vm_item(),
            json!({
                "serviceName": "Storage",
                "productName": "Blob Storage",
                "skuName": "Hot LRS",
                "meterName": "Hot LRS Data Stored",
                "armSkuName": "Standard_LRS",
                "unitOfMeasure": "1 GB/Month",
                "retailPrice": 0.0208
            }),
        );
        let result = normalizer().normalize(&raw(7, item)).await;
        let record = &result.records[0];
        assert_eq!(record.resource_name, "Hot Storage");
        assert_eq!(record.unit, "GB-month");
        assert_eq!(record.service_category, "Storage");
    }

    #[tokio::test]
    async fn test_snapshot_meter_is_not_a_storage_tier() {
        let item = with(
            vm_item(),
            json!({
                "serviceName": "Storage",
                "productName": "Standard Page Blob",
                "skuName": "Snapshots LRS",
                "meterName": "LRS Snapshots",
                "armSkuName": "",
                "unitOfMeasure": "1 GB/Month",
                "retailPrice": 0.05
            }),
        );
        let result = normalizer().normalize(&raw(13, item)).await;
        let record = &result.records[0];
        assert_eq!(record.resource_name, "Standard Page Blob Snapshots LRS");

        let cool = with(
            vm_item(),
            json!({
                "serviceName": "Storage",
                "skuName": "COOL GRS",
                "meterName": "Cool GRS Data Stored",
                "unitOfMeasure": "1 GB/Month",
                "retailPrice": 0.01
            }),
        );
        let result = normalizer().normalize(&raw(14, cool)).await;
        assert_eq!(result.records[0].resource_name, "Cool Storage");
    }

    #[tokio::test]
    async fn test_zero_price_is_skipped() {
        let result = normalizer()
            .normalize(&raw(8, with(vm_item(), json!({ "retailPrice": 0.0 }))))
            .await;
        assert!(!result.success);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.error_count, 0);
    }

    #[tokio::test]
    async fn test_unmapped_service_is_skipped() {
        let result = normalizer()
            .normalize(&raw(9, with(vm_item(), json!({ "serviceName": "Quantum Computing" }))))
            .await;
        assert!(!result.success);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.error_count, 0);
    }

    #[tokio::test]
    async fn test_missing_required_fields_are_errors() {
        let mut item = vm_item();
        if let Some(map) = item.as_object_mut() {
            map.remove("currencyCode");
        }
        let missing = normalizer().normalize(&raw(10, item)).await;
        assert_eq!(missing.error_count, 1);
        assert_eq!(missing.skipped_count, 0);

        let blank = normalizer()
            .normalize(&raw(11, with(vm_item(), json!({ "meterName": " " }))))
            .await;
        assert_eq!(blank.error_count, 1);
        assert!(blank.errors[0].contains("meterName"));
    }

    #[tokio::test]
    async fn test_invalid_currency_fails_output_validation() {
        let result = normalizer()
            .normalize(&raw(12, with(vm_item(), json!({ "currencyCode": "USDT" }))))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_count, 1);
        assert!(result.errors[0].contains("currency"));
    }
}
