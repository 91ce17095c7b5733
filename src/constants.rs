/// Defaults applied to a job configuration when the caller leaves them unset
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CONCURRENT_WORKERS: usize = 4;

/// Batches buffered per worker between the generator and the worker pool
pub const BATCH_CHANNEL_FACTOR: usize = 2;

/// Output record bounds
pub const MAX_PRICE_PER_UNIT: f64 = 999_999.99;
pub const MAX_RESOURCE_NAME_LEN: usize = 500;

/// Input record bounds
pub const MAX_SERVICE_CODE_LEN: usize = 255;
pub const MAX_REGION_LEN: usize = 100;

pub const DEFAULT_CONFIG_PATH: &str = "pricing.toml";
pub const DEFAULT_DB_PATH: &str = "data/pricing.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
