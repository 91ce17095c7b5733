use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::common::error::CoreError;

pub mod query;

pub use query::{NormalizedPricingFilter, OrderBy, RawRecordFilter, SortDirection};

/// Cloud vendors whose retail pricing this system understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Aws, Provider::Azure];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            other => Err(CoreError::InvalidData {
                message: format!("unknown provider '{other}'"),
            }),
        }
    }
}

/// How a price line is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PricingModel {
    #[serde(rename = "on_demand")]
    OnDemand,
    #[serde(rename = "reserved_1yr")]
    Reserved1Yr,
    #[serde(rename = "reserved_3yr")]
    Reserved3Yr,
    #[serde(rename = "spot")]
    Spot,
    #[serde(rename = "savings_plan")]
    SavingsPlan,
}

impl PricingModel {
    pub const ALL: [PricingModel; 5] = [
        PricingModel::OnDemand,
        PricingModel::Reserved1Yr,
        PricingModel::Reserved3Yr,
        PricingModel::Spot,
        PricingModel::SavingsPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingModel::OnDemand => "on_demand",
            PricingModel::Reserved1Yr => "reserved_1yr",
            PricingModel::Reserved3Yr => "reserved_3yr",
            PricingModel::Spot => "spot",
            PricingModel::SavingsPlan => "savings_plan",
        }
    }
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingModel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PricingModel::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| CoreError::InvalidData {
                message: format!("unknown pricing model '{s}'"),
            })
    }
}

/// Raw vendor pricing row as written by the collectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPricingRecord {
    pub id: i64,
    pub provider: String,
    pub service_code: String,
    pub region: String,
    pub service_family: Option<String>,
    /// Vendor JSON, kept as text exactly as collected
    pub payload: String,
    pub collection_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMapping {
    pub provider: Provider,
    pub vendor_service_name: String,
    pub vendor_service_code: Option<String>,
    pub canonical_service_type: String,
    pub service_category: String,
    pub service_family: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub canonical_code: String,
    pub aws_region: Option<String>,
    pub azure_region: Option<String>,
    pub display_name: String,
    pub country: Option<String>,
    pub continent: Option<String>,
}

impl NormalizedRegion {
    /// The vendor-specific region name for `provider`, if this region exists there
    pub fn vendor_region(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Aws => self.aws_region.as_deref(),
            Provider::Azure => self.azure_region.as_deref(),
        }
    }
}

/// Best-effort hardware shape of a priced resource. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpecs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_performance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_speed_ghz: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burstable: Option<bool>,
}

impl ResourceSpecs {
    pub fn is_empty(&self) -> bool {
        *self == ResourceSpecs::default()
    }
}

/// Commitment terms, only filled for non on-demand lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upfront_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_percent: Option<f64>,
}

/// A price line in the provider-agnostic schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPricing {
    pub id: Uuid,
    pub provider: Provider,
    pub provider_service_code: String,
    pub provider_sku: Option<String>,
    pub service_category: String,
    pub service_family: String,
    pub service_type: String,
    pub normalized_region: String,
    pub provider_region: String,
    pub resource_name: String,
    pub resource_description: Option<String>,
    pub resource_specs: ResourceSpecs,
    pub price_per_unit: f64,
    pub unit: String,
    pub currency: String,
    pub pricing_model: PricingModel,
    pub pricing_details: PricingDetails,
    pub effective_date: Option<DateTime<Utc>>,
    /// Minimum billed quantity before this price applies
    pub minimum_commitment: f64,
    pub source_raw_id: i64,
}
