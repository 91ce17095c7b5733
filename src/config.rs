use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{EtlError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub pipeline: PipelineDefaults,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(constants::DEFAULT_DB_PATH),
        }
    }
}

/// Fallbacks for jobs that leave batch size or worker count unset
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineDefaults {
    pub batch_size: usize,
    pub concurrent_workers: usize,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            concurrent_workers: constants::DEFAULT_CONCURRENT_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listener, e.g. "127.0.0.1:9898". Unset disables the exporter.
    pub listen_addr: Option<String>,
}

impl Config {
    /// Load `.env`, then the TOML file (`PRICING_CONFIG` or `pricing.toml`), then env overrides.
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let path = std::env::var("PRICING_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(constants::DEFAULT_CONFIG_PATH));
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PRICING_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("PRICING_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("PRICING_METRICS_ADDR") {
            self.metrics.listen_addr = Some(addr);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(EtlError::Config("pipeline.batch_size must be positive".to_string()));
        }
        if self.pipeline.concurrent_workers == 0 {
            return Err(EtlError::Config(
                "pipeline.concurrent_workers must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
