// Per-record processing: units, specs, mappings, validation, provider normalizers

pub mod mapping;
pub mod normalize;
pub mod specs;
pub mod units;
pub mod validation;
