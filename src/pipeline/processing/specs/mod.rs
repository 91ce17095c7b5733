//! Best-effort hardware spec inference from vendor attributes
//!
//! Extractors never fail: anything they cannot read stays `None` on the
//! returned [`ResourceSpecs`].

use pricing_core::{Provider, ResourceSpecs};
use std::collections::HashMap;

pub mod aws;
pub mod azure;

pub use aws::AwsSpecExtractor;
pub use azure::AzureSpecExtractor;

/// Vendor attribute bag, keyed by the vendor's own attribute names
pub type Attributes = HashMap<String, String>;

pub trait ResourceSpecExtractor: Send + Sync {
    fn extract(&self, canonical_service_type: &str, attributes: &Attributes) -> ResourceSpecs;
}

/// Dispatch to the extractor for `provider`
pub fn extract_specs(
    provider: Provider,
    canonical_service_type: &str,
    attributes: &Attributes,
) -> ResourceSpecs {
    match provider {
        Provider::Aws => AwsSpecExtractor.extract(canonical_service_type, attributes),
        Provider::Azure => AzureSpecExtractor.extract(canonical_service_type, attributes),
    }
}

/// Parse "8 GiB", "0.5 GB", "1,952 GiB" into gigabytes
pub(crate) fn parse_gigabytes(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    let number = cleaned
        .trim_end_matches("GiB")
        .trim_end_matches("GB")
        .trim();
    number.parse::<f64>().ok().filter(|v| *v > 0.0)
}

/// Parse a positive integer count, treating "NA" and blanks as absent
pub(crate) fn parse_count(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") {
        return None;
    }
    trimmed.parse::<u32>().ok().filter(|v| *v > 0)
}
