use async_trait::async_trait;
use pricing_core::{PricingDetails, PricingModel, Provider, RawPricingRecord, ResourceSpecs};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

use super::base::{
    build_record, non_empty, parse_effective_date, settle_context, NormalizerServices, PriceLine,
    ProviderNormalizer,
};
use crate::pipeline::processing::normalize::{NormalizationContext, NormalizationResult};
use crate::pipeline::processing::specs::{extract_specs, Attributes};

/// One entry of the AWS Price List bulk API
#[derive(Debug, Deserialize)]
struct AwsPriceListItem {
    product: AwsProduct,
    terms: AwsTerms,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwsProduct {
    sku: String,
    #[serde(default)]
    product_family: Option<String>,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsTerms {
    #[serde(default)]
    on_demand: BTreeMap<String, AwsTerm>,
    #[serde(default)]
    reserved: BTreeMap<String, AwsTerm>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwsTerm {
    #[serde(default)]
    effective_date: Option<String>,
    #[serde(default)]
    price_dimensions: BTreeMap<String, AwsPriceDimension>,
    #[serde(default)]
    term_attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwsPriceDimension {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    begin_range: Option<String>,
    price_per_unit: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermType {
    OnDemand,
    Reserved,
}

impl TermType {
    fn as_str(&self) -> &'static str {
        match self {
            TermType::OnDemand => "OnDemand",
            TermType::Reserved => "Reserved",
        }
    }
}

pub struct AwsNormalizer {
    services: NormalizerServices,
}

impl AwsNormalizer {
    pub fn new(services: NormalizerServices) -> Self {
        Self { services }
    }

    #[allow(clippy::too_many_arguments)]
    fn price_line(
        &self,
        ctx: &NormalizationContext,
        item: &AwsPriceListItem,
        specs: &ResourceSpecs,
        term_type: TermType,
        term: &AwsTerm,
        dimension_key: &str,
        dimension: &AwsPriceDimension,
        result: &mut NormalizationResult,
    ) -> Option<PriceLine> {
        let Some((currency, raw_price)) = pick_price(&dimension.price_per_unit) else {
            result.push_error(format!(
                "raw record {}: dimension {} has no price",
                ctx.source_raw_id, dimension_key
            ));
            return None;
        };
        let price = match raw_price.trim().parse::<f64>() {
            Ok(price) => price,
            Err(_) => {
                result.push_error(format!(
                    "raw record {}: dimension {} has unparseable price '{}'",
                    ctx.source_raw_id, dimension_key, raw_price
                ));
                return None;
            }
        };
        if price == 0.0 {
            result.skipped_count += 1;
            return None;
        }

        let (unit, price_per_unit) =
            self.services
                .canonical_price(Provider::Aws, &dimension.unit, price);
        let pricing_model = pricing_model(term_type, &term.term_attributes);
        let pricing_details = match term_type {
            TermType::OnDemand => PricingDetails::default(),
            TermType::Reserved => reserved_details(term, dimension, price),
        };

        Some(PriceLine {
            line_key: format!("{}:{}", term_type.as_str(), dimension_key),
            provider_sku: Some(item.product.sku.clone()),
            resource_name: resource_name(ctx, &item.product),
            resource_description: dimension.description.clone(),
            resource_specs: specs.clone(),
            price_per_unit,
            unit,
            currency: currency.to_string(),
            pricing_model,
            pricing_details,
            effective_date: parse_effective_date(term.effective_date.as_deref()),
            minimum_commitment: dimension
                .begin_range
                .as_deref()
                .and_then(|r| r.trim().parse::<f64>().ok())
                .filter(|r| r.is_finite())
                .unwrap_or(0.0),
        })
    }
}

#[async_trait]
impl ProviderNormalizer for AwsNormalizer {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    #[instrument(skip(self, record), fields(raw_id = record.id))]
    async fn normalize(&self, record: &RawPricingRecord) -> NormalizationResult {
        if let Some(rejected) = self.services.reject_invalid(record) {
            return rejected;
        }

        let item: AwsPriceListItem = match serde_json::from_str(&record.payload) {
            Ok(item) => item,
            Err(e) => {
                return NormalizationResult::failed(format!(
                    "raw record {}: not an AWS price list item: {}",
                    record.id, e
                ))
            }
        };

        let lookup = self
            .services
            .resolve_context(Provider::Aws, &record.service_code, &record.region, record)
            .await;
        let ctx = match settle_context(record, lookup) {
            Ok(ctx) => ctx,
            Err(result) => return result,
        };

        let specs = extract_specs(
            Provider::Aws,
            &ctx.service_mapping.canonical_service_type,
            &item.product.attributes,
        );

        let mut result = NormalizationResult::default();
        let term_groups = [
            (TermType::OnDemand, &item.terms.on_demand),
            (TermType::Reserved, &item.terms.reserved),
        ];
        for (term_type, terms) in term_groups {
            for term in terms.values() {
                for (dimension_key, dimension) in &term.price_dimensions {
                    if let Some(line) = self.price_line(
                        &ctx,
                        &item,
                        &specs,
                        term_type,
                        term,
                        dimension_key,
                        dimension,
                        &mut result,
                    ) {
                        let normalized =
                            build_record(&ctx, &record.service_code, &record.region, line);
                        self.services.accept(&mut result, normalized);
                    }
                }
            }
        }

        debug!(
            records = result.records.len(),
            skipped = result.skipped_count,
            errors = result.error_count,
            "Normalized AWS record"
        );
        result.finish()
    }
}

/// USD when quoted, otherwise the first currency in key order
fn pick_price(prices: &BTreeMap<String, String>) -> Option<(&str, &str)> {
    prices
        .get_key_value("USD")
        .or_else(|| prices.iter().next())
        .map(|(currency, price)| (currency.as_str(), price.as_str()))
}

fn pricing_model(term_type: TermType, term_attributes: &HashMap<String, String>) -> PricingModel {
    match term_type {
        TermType::OnDemand => PricingModel::OnDemand,
        TermType::Reserved => {
            let length = term_attributes
                .get("LeaseContractLength")
                .map(|l| l.to_lowercase())
                .unwrap_or_default();
            if length.starts_with('3') {
                PricingModel::Reserved3Yr
            } else {
                PricingModel::Reserved1Yr
            }
        }
    }
}

/// Upfront fees come as a `Quantity` dimension, recurring charges as hourly ones
fn reserved_details(term: &AwsTerm, dimension: &AwsPriceDimension, price: f64) -> PricingDetails {
    let upfront = dimension.unit.eq_ignore_ascii_case("quantity");
    PricingDetails {
        term_length: term.term_attributes.get("LeaseContractLength").cloned(),
        payment_option: term.term_attributes.get("PurchaseOption").cloned(),
        upfront_cost: upfront.then_some(price),
        hourly_rate: (!upfront).then_some(price),
        savings_percent: None,
    }
}

fn resource_name(ctx: &NormalizationContext, product: &AwsProduct) -> String {
    let attr = |key: &str| non_empty(product.attributes.get(key).map(String::as_str));

    if let Some(instance_type) = attr("instanceType") {
        return instance_type.to_string();
    }

    let service_type = ctx.service_mapping.canonical_service_type.to_lowercase();
    let is_lambda = attr("servicecode") == Some("AWSLambda")
        || ctx.service_mapping.vendor_service_name == "AWSLambda"
        || service_type.contains("function");
    if is_lambda {
        return format!("Lambda ({})", lambda_architecture(&product.attributes));
    }

    ["volumeApiName", "storageClass", "usagetype", "group"]
        .into_iter()
        .find_map(attr)
        .or(non_empty(product.product_family.as_deref()))
        .unwrap_or(ctx.service_mapping.vendor_service_name.as_str())
        .to_string()
}

fn lambda_architecture(attributes: &Attributes) -> &'static str {
    let arch = attributes
        .get("processorArchitecture")
        .or_else(|| attributes.get("group"))
        .map(|a| a.to_lowercase())
        .unwrap_or_default();
    if arch.contains("arm") {
        "arm64"
    } else {
        "x86_64"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricing_core::storage::InMemoryStorage;
    use pricing_core::{NormalizedRegion, ServiceMapping};
    use serde_json::json;
    use std::sync::Arc;

    fn storage() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        for (name, service_type, category, family) in [
            ("AmazonEC2", "Compute Instance", "Compute", "Virtual Machines"),
            ("AWSLambda", "Serverless Function", "Compute", "Serverless"),
        ] {
            storage
                .add_service_mapping(ServiceMapping {
                    provider: Provider::Aws,
                    vendor_service_name: name.to_string(),
                    vendor_service_code: Some(name.to_string()),
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
        storage
    }

    fn normalizer(storage: InMemoryStorage) -> AwsNormalizer {
        AwsNormalizer::new(NormalizerServices::from_store(Arc::new(storage)))
    }

    fn raw(id: i64, service_code: &str, region: &str, payload: serde_json::Value) -> RawPricingRecord {
        RawPricingRecord {
            id,
            provider: "aws".to_string(),
            service_code: service_code.to_string(),
            region: region.to_string(),
            service_family: None,
            payload: payload.to_string(),
            collection_id: "collection-1".to_string(),
        }
    }

    fn m5_large(on_demand_price: &str) -> serde_json::Value {
        json!({
            "product": {
                "sku": "SKU123",
                "productFamily": "Compute Instance",
                "attributes": {
                    "servicecode": "AmazonEC2",
                    "instanceType": "m5.large",
                    "vcpu": "2",
                    "memory": "8 GiB",
                    "storage": "EBS only",
                    "networkPerformance": "Up to 10 Gigabit",
                    "gpu": "NA"
                }
            },
            "terms": {
                "OnDemand": {
                    "SKU123.JRTCKXETXF": {
                        "effectiveDate": "2024-03-01T00:00:00Z",
                        "priceDimensions": {
                            "SKU123.JRTCKXETXF.6YS6EN2CT7": {
                                "description": "$0.096 per On Demand Linux m5.large Instance Hour",
                                "unit": "Hrs",
                                "beginRange": "0",
                                "endRange": "Inf",
                                "pricePerUnit": { "USD": on_demand_price }
                            }
                        },
                        "termAttributes": {}
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_on_demand_instance() {
        let result = normalizer(storage())
            .normalize(&raw(1, "AmazonEC2", "us-east-1", m5_large("0.0960000000")))
            .await;

        assert!(result.success);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.resource_name, "m5.large");
        assert_eq!(record.unit, "hour");
        assert_eq!(record.currency, "USD");
        assert_eq!(record.pricing_model, PricingModel::OnDemand);
        assert_eq!(record.service_category, "Compute");
        assert_eq!(record.normalized_region, "us-east");
        assert_eq!(record.provider_region, "us-east-1");
        assert_eq!(record.provider_sku.as_deref(), Some("SKU123"));
        assert_eq!(record.resource_specs.vcpu, Some(2));
        assert_eq!(record.resource_specs.memory_gb, Some(8.0));
        assert!((record.price_per_unit - 0.096).abs() < 1e-9);
        assert!(record.effective_date.is_some());
        assert_eq!(record.pricing_details, PricingDetails::default());
    }

    #[tokio::test]
    async fn test_zero_price_is_skipped_not_errored() {
        let result = normalizer(storage())
            .normalize(&raw(2, "AmazonEC2", "us-east-1", m5_large("0.0000000000")))
            .await;

        assert!(!result.success);
        assert!(result.records.is_empty());
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.error_count, 0);
    }

    #[tokio::test]
    async fn test_reserved_term_yields_upfront_and_hourly_lines() {
        let payload = json!({
            "product": {
                "sku": "SKU123",
                "productFamily": "Compute Instance",
                "attributes": { "instanceType": "m5.large", "vcpu": "2", "memory": "8 GiB" }
            },
            "terms": {
                "Reserved": {
                    "SKU123.4NA7Y494T4": {
                        "effectiveDate": "2024-03-01T00:00:00Z",
                        "priceDimensions": {
                            "SKU123.4NA7Y494T4.2TG2D8R56U": {
                                "description": "Upfront Fee",
                                "unit": "Quantity",
                                "pricePerUnit": { "USD": "1234" }
                            },
                            "SKU123.4NA7Y494T4.6YS6EN2CT7": {
                                "description": "Linux/UNIX (Amazon VPC), m5.large reserved instance applied",
                                "unit": "Hrs",
                                "pricePerUnit": { "USD": "0.0470000000" }
                            }
                        },
                        "termAttributes": {
                            "LeaseContractLength": "3yr",
                            "OfferingClass": "standard",
                            "PurchaseOption": "Partial Upfront"
                        }
                    }
                }
            }
        });

        let result = normalizer(storage())
            .normalize(&raw(3, "AmazonEC2", "us-east-1", payload))
            .await;

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.error_count, 0);
        for record in &result.records {
            assert_eq!(record.pricing_model, PricingModel::Reserved3Yr);
            assert_eq!(record.provider_sku.as_deref(), Some("SKU123"));
            assert_eq!(record.pricing_details.term_length.as_deref(), Some("3yr"));
            assert_eq!(
                record.pricing_details.payment_option.as_deref(),
                Some("Partial Upfront")
            );
        }
        assert_ne!(result.records[0].id, result.records[1].id);

        let upfront = result
            .records
            .iter()
            .find(|r| r.pricing_details.upfront_cost.is_some())
            .unwrap();
        assert_eq!(upfront.pricing_details.upfront_cost, Some(1234.0));
        assert_eq!(upfront.unit, "quantity");
        let hourly = result
            .records
            .iter()
            .find(|r| r.pricing_details.hourly_rate.is_some())
            .unwrap();
        assert_eq!(hourly.unit, "hour");
    }

    #[tokio::test]
    async fn test_lambda_naming() {
        let payload = json!({
            "product": {
                "sku": "LAMBDA1",
                "productFamily": "Serverless",
                "attributes": {
                    "servicecode": "AWSLambda",
                    "group": "AWS-Lambda-Duration-ARM",
                    "usagetype": "USE1-Lambda-GB-Second-ARM"
                }
            },
            "terms": {
                "OnDemand": {
                    "LAMBDA1.JRTCKXETXF": {
                        "priceDimensions": {
                            "LAMBDA1.JRTCKXETXF.6YS6EN2CT7": {
                                "unit": "Lambda-GB-Second",
                                "pricePerUnit": { "USD": "0.0000133334" }
                            }
                        }
                    }
                }
            }
        });

        let result = normalizer(storage())
            .normalize(&raw(4, "AWSLambda", "us-east-1", payload))
            .await;

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].resource_name, "Lambda (arm64)");
        assert_eq!(result.records[0].unit, "GB-second");
    }

    #[tokio::test]
    async fn test_unmapped_region_is_a_skip() {
        let result = normalizer(storage())
            .normalize(&raw(5, "AmazonEC2", "ap-south-2", m5_large("0.096")))
            .await;

        assert!(!result.success);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.error_count, 0);
    }

    #[tokio::test]
    async fn test_structural_mismatch_is_an_error() {
        let result = normalizer(storage())
            .normalize(&raw(6, "AmazonEC2", "us-east-1", json!({ "product": { "sku": "X" } })))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.skipped_count, 0);
        assert!(result.errors[0].contains("not an AWS price list item"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_an_error() {
        let mut record = raw(7, "AmazonEC2", "us-east-1", m5_large("0.096"));
        record.region = String::new();
        let result = normalizer(storage()).normalize(&record).await;

        assert_eq!(result.error_count, 1);
        assert!(result.errors[0].contains("region"));
    }

    #[tokio::test]
    async fn test_normalization_is_deterministic() {
        let normalizer = normalizer(storage());
        let record = raw(8, "AmazonEC2", "us-east-1", m5_large("0.096"));
        let first = normalizer.normalize(&record).await;
        let second = normalizer.normalize(&record).await;
        assert_eq!(first.records[0].id, second.records[0].id);
    }
}
