//! Lock factory

use std::fmt;
use std::sync::Arc;

use crate::adapter::LockAdapter;
use crate::config::LoccoConfig;
use crate::error::Result;
use crate::lock::Lock;
use crate::retry::RetrySettings;
use crate::validation;

/// Default number of acquisition attempts
pub const DEFAULT_RETRY_TIMES: u32 = 10;

/// Default delay between acquisition attempts in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 300;

/// Stamps out [`Lock`] handles sharing one adapter and one retry policy
///
/// Cheap to clone and safe to share between tasks.
#[derive(Clone)]
pub struct Locker {
    adapter: Arc<dyn LockAdapter>,
    retry_settings: RetrySettings,
}

impl fmt::Debug for Locker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("adapter", &self.adapter.name())
            .field("retry_settings", &self.retry_settings)
            .finish()
    }
}

impl Locker {
    /// Create a locker, validating `retry_settings` once
    pub fn new(adapter: Arc<dyn LockAdapter>, retry_settings: RetrySettings) -> Result<Self> {
        retry_settings.validate()?;
        Ok(Self {
            adapter,
            retry_settings,
        })
    }

    /// Create a locker retrying 10 times, 300 ms apart
    pub fn with_default_retry(adapter: Arc<dyn LockAdapter>) -> Self {
        Self {
            adapter,
            retry_settings: RetrySettings::fixed(DEFAULT_RETRY_TIMES, DEFAULT_RETRY_DELAY_MS),
        }
    }

    /// Create a locker whose retry policy comes from configuration
    pub fn from_config(adapter: Arc<dyn LockAdapter>, config: &LoccoConfig) -> Result<Self> {
        Self::new(adapter, config.retry_settings()?)
    }

    /// A fresh handle for `key` with a new owner token
    pub fn lock(&self, key: impl Into<String>, ttl_ms: u64) -> Result<Lock> {
        let key = key.into();
        validation::validate_ttl(ttl_ms)?;
        validation::validate_key(&key)?;
        Lock::new(self.adapter.clone(), key, ttl_ms, self.retry_settings.clone())
    }

    pub fn adapter(&self) -> &Arc<dyn LockAdapter> {
        &self.adapter
    }

    pub fn retry_settings(&self) -> &RetrySettings {
        &self.retry_settings
    }
}
