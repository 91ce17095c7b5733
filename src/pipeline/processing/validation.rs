use pricing_core::{NormalizedPricing, Provider, RawPricingRecord};
use thiserror::Error;

use crate::constants::{
    MAX_PRICE_PER_UNIT, MAX_REGION_LEN, MAX_RESOURCE_NAME_LEN, MAX_SERVICE_CODE_LEN,
};
use crate::observability::metrics;

/// Which constraint a record broke, and with what value
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {message} (value: {value:?})")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, value: impl ToString, message: impl Into<String>) -> Self {
        metrics::normalize::validation_failed(field);
        Self {
            field,
            value: value.to_string(),
            message: message.into(),
        }
    }
}

pub type ValidationResult = std::result::Result<(), ValidationError>;

#[derive(Debug, Clone, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Checks a raw record before any parsing is attempted
    pub fn validate_input(&self, record: &RawPricingRecord) -> ValidationResult {
        if record.id <= 0 {
            return Err(ValidationError::new("id", record.id, "must be positive"));
        }
        if record.provider.parse::<Provider>().is_err() {
            return Err(ValidationError::new(
                "provider",
                &record.provider,
                "must be one of aws, azure",
            ));
        }
        check_bounded("service_code", &record.service_code, MAX_SERVICE_CODE_LEN)?;
        check_bounded("region", &record.region, MAX_REGION_LEN)?;

        let payload = record.payload.trim();
        if payload.is_empty() {
            return Err(ValidationError::new("payload", "", "must not be empty"));
        }
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) if is_empty_json(&value) => Err(ValidationError::new(
                "payload",
                truncate(payload),
                "must not be an empty JSON document",
            )),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::new(
                "payload",
                truncate(payload),
                format!("malformed JSON: {e}"),
            )),
        }
    }

    /// Checks a canonical record just before it is handed to the sink
    pub fn validate_output(&self, record: &NormalizedPricing) -> ValidationResult {
        check_bounded("resource_name", &record.resource_name, MAX_RESOURCE_NAME_LEN)?;

        let price = record.price_per_unit;
        if !price.is_finite() || price <= 0.0 || price > MAX_PRICE_PER_UNIT {
            return Err(ValidationError::new(
                "price_per_unit",
                price,
                format!("must be in (0, {MAX_PRICE_PER_UNIT}]"),
            ));
        }
        if record.unit.trim().is_empty() {
            return Err(ValidationError::new("unit", &record.unit, "must not be empty"));
        }
        let currency = &record.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::new(
                "currency",
                currency,
                "must be exactly 3 letters",
            ));
        }
        Ok(())
    }
}

fn check_bounded(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, value, "must not be empty"));
    }
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            truncate(value),
            format!("must be at most {max_len} characters"),
        ));
    }
    Ok(())
}

fn is_empty_json(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn truncate(value: &str) -> String {
    value.chars().take(80).collect()
}
