use once_cell::sync::Lazy;
use pricing_core::Provider;
use std::collections::HashMap;

/// Maps vendor unit strings onto the canonical unit vocabulary
pub trait UnitNormalizer: Send + Sync {
    /// Canonical unit for `raw_unit`; unknown units come back unchanged
    fn normalize(&self, provider: Provider, raw_unit: &str) -> String;

    /// Rescale a price quoted per `raw_unit` so it is quoted per `canonical_unit`
    fn convert_value(&self, raw_unit: &str, canonical_unit: &str, value: f64) -> f64;
}

#[derive(Debug, Clone, Copy)]
struct UnitRule {
    canonical: &'static str,
    /// How many canonical units one raw unit stands for
    scale: f64,
}

const fn unit(canonical: &'static str) -> UnitRule {
    UnitRule { canonical, scale: 1.0 }
}

const fn scaled(canonical: &'static str, scale: f64) -> UnitRule {
    UnitRule { canonical, scale }
}

static AWS_UNITS: Lazy<HashMap<&'static str, UnitRule>> = Lazy::new(|| {
    HashMap::from([
        ("hrs", unit("hour")),
        ("hours", unit("hour")),
        ("vcpu-hours", unit("vCPU-hour")),
        ("gb-hours", unit("GB-hour")),
        ("acu-hr", unit("ACU-hour")),
        ("lcu-hrs", unit("LCU-hour")),
        ("gb-mo", unit("GB-month")),
        ("gb-month", unit("GB-month")),
        ("iops-mo", unit("IOPS-month")),
        ("lambda-gb-second", unit("GB-second")),
        ("gb-seconds", unit("GB-second")),
        ("requests", unit("request")),
        ("ios", unit("IO")),
        ("quantity", unit("quantity")),
    ])
});

static AZURE_UNITS: Lazy<HashMap<&'static str, UnitRule>> = Lazy::new(|| {
    HashMap::from([
        ("1 hour", unit("hour")),
        ("10 hours", scaled("hour", 10.0)),
        ("100 hours", scaled("hour", 100.0)),
        ("1 gb/hour", unit("GB-hour")),
        ("1 gb/month", unit("GB-month")),
        ("10 gb/month", scaled("GB-month", 10.0)),
        ("100 gb/month", scaled("GB-month", 100.0)),
        ("1 gb", unit("GB")),
        ("1 gb second", unit("GB-second")),
        ("1/month", unit("month")),
        ("1/day", unit("day")),
        ("1 day", unit("day")),
        ("10k", scaled("request", 10_000.0)),
        ("1m", scaled("request", 1_000_000.0)),
        ("1k", scaled("request", 1_000.0)),
    ])
});

static GENERIC_UNITS: Lazy<HashMap<&'static str, UnitRule>> = Lazy::new(|| {
    HashMap::from([
        ("hour", unit("hour")),
        ("hr", unit("hour")),
        ("hrs", unit("hour")),
        ("hours", unit("hour")),
        ("1 hour", unit("hour")),
        ("per hour", unit("hour")),
        ("month", unit("month")),
        ("per month", unit("month")),
        ("gb", unit("GB")),
        ("gb-month", unit("GB-month")),
        ("second", unit("second")),
        ("request", unit("request")),
        ("requests", unit("request")),
        ("per request", unit("request")),
        ("per 1,000 requests", scaled("request", 1_000.0)),
        ("per 10,000 requests", scaled("request", 10_000.0)),
        ("per million requests", scaled("request", 1_000_000.0)),
    ])
});

fn unit_key(raw_unit: &str) -> String {
    raw_unit
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn provider_table(provider: Provider) -> &'static HashMap<&'static str, UnitRule> {
    match provider {
        Provider::Aws => &AWS_UNITS,
        Provider::Azure => &AZURE_UNITS,
    }
}

/// Table-driven unit normalizer: provider table, then the generic table, then pass-through
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnitNormalizer;

impl StandardUnitNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl UnitNormalizer for StandardUnitNormalizer {
    fn normalize(&self, provider: Provider, raw_unit: &str) -> String {
        let key = unit_key(raw_unit);
        provider_table(provider)
            .get(key.as_str())
            .or_else(|| GENERIC_UNITS.get(key.as_str()))
            .map(|rule| rule.canonical.to_string())
            .unwrap_or_else(|| raw_unit.to_string())
    }

    fn convert_value(&self, raw_unit: &str, canonical_unit: &str, value: f64) -> f64 {
        let key = unit_key(raw_unit);
        [&*AWS_UNITS, &*AZURE_UNITS, &*GENERIC_UNITS]
            .into_iter()
            .filter_map(|table| table.get(key.as_str()))
            .find(|rule| rule.canonical == canonical_unit)
            .map_or(value, |rule| value / rule.scale)
    }
}
