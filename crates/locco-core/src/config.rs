//! Configuration for lockers and adapters
//!
//! Values come from an optional file (YAML, TOML or JSON by extension)
//! overlaid with `LOCCO__*` environment variables, e.g.
//! `LOCCO__RETRY__TIMES=5` sets `retry.times`.

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use crate::error::{LoccoError, Result};
use crate::locker::{DEFAULT_RETRY_DELAY_MS, DEFAULT_RETRY_TIMES};
use crate::retry::RetrySettings;

/// Default collection holding document-store lock records
pub const DEFAULT_MONGO_COLLECTION: &str = "locco-locks";

/// Configuration wrapper with typed accessors
#[derive(Clone, Debug, Default)]
pub struct LoccoConfig {
    pub config: Config,
}

impl LoccoConfig {
    /// Create a configuration from a Config instance
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Load `path` (if any) and overlay environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("LOCCO").separator("__"))
            .build()?;
        Ok(Self::from_config(config))
    }

    fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.config.get_int(key) {
            Ok(value) => u64::try_from(value).map(Some).map_err(|_| {
                LoccoError::validation(format!("{} should be a non-negative integer", key))
            }),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Maximum acquisition attempts (default: 10)
    pub fn retry_times(&self) -> Result<u32> {
        match self.get_u64("retry.times")? {
            Some(value) => u32::try_from(value)
                .map_err(|_| LoccoError::validation("retry.times is too large")),
            None => Ok(DEFAULT_RETRY_TIMES),
        }
    }

    /// Delay between acquisition attempts in milliseconds (default: 300)
    pub fn retry_delay_ms(&self) -> Result<u64> {
        Ok(self
            .get_u64("retry.delay")?
            .unwrap_or(DEFAULT_RETRY_DELAY_MS))
    }

    /// Wall-clock budget for one acquisition in milliseconds (default: none)
    pub fn retry_total_time_ms(&self) -> Result<Option<u64>> {
        self.get_u64("retry.total_time")
    }

    /// Document-store database; `None` means the client's default database
    pub fn mongo_database(&self) -> Result<Option<String>> {
        self.get_string("mongo.database")
    }

    /// Document-store collection (default: "locco-locks")
    pub fn mongo_collection(&self) -> Result<String> {
        Ok(self
            .get_string("mongo.collection")?
            .unwrap_or_else(|| DEFAULT_MONGO_COLLECTION.to_string()))
    }

    /// Validated fixed-delay retry settings
    pub fn retry_settings(&self) -> Result<RetrySettings> {
        let mut settings = RetrySettings::fixed(self.retry_times()?, self.retry_delay_ms()?);
        settings.total_time_ms = self.retry_total_time_ms()?;
        settings.validate()?;
        Ok(settings)
    }
}
