//! Lock handle and its lifecycle
//!
//! A [`Lock`] is single-use: `Idle -> Acquired -> Released`. A failed
//! acquire leaves it `Idle` and a failed extend leaves it `Acquired`.
//! The state is a sequential guard, not a mutex; a handle belongs to one
//! caller at a time.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::adapter::LockAdapter;
use crate::error::{LoccoError, Result};
use crate::metrics;
use crate::retry::{RetrySettings, retry};
use crate::token::generate_owner_token;
use crate::validation;

/// Lifecycle state of a lock handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Constructed, not acquired yet
    Idle,
    /// Acquisition succeeded
    Acquired,
    /// Release was attempted; the handle is spent
    Released,
}

/// Options for [`Lock::release`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    /// Propagate adapter failures instead of swallowing them
    pub throw_on_fail: bool,
}

impl ReleaseOptions {
    pub fn throw_on_fail() -> Self {
        Self {
            throw_on_fail: true,
        }
    }
}

/// Handle on one lock key, bound to one adapter and one owner token
pub struct Lock {
    adapter: Arc<dyn LockAdapter>,
    key: String,
    ttl_ms: u64,
    owner_token: String,
    retry_settings: RetrySettings,
    state: LockState,
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("adapter", &self.adapter.name())
            .field("key", &self.key)
            .field("ttl_ms", &self.ttl_ms)
            .field("retry_settings", &self.retry_settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Lock {
    /// Create a handle with a freshly generated owner token
    pub fn new(
        adapter: Arc<dyn LockAdapter>,
        key: impl Into<String>,
        ttl_ms: u64,
        retry_settings: RetrySettings,
    ) -> Result<Self> {
        Self::with_owner_token(adapter, key, ttl_ms, retry_settings, generate_owner_token())
    }

    /// Create a handle with a caller-supplied owner token
    pub fn with_owner_token(
        adapter: Arc<dyn LockAdapter>,
        key: impl Into<String>,
        ttl_ms: u64,
        retry_settings: RetrySettings,
        owner_token: impl Into<String>,
    ) -> Result<Self> {
        let key = key.into();
        let owner_token = owner_token.into();
        retry_settings.validate()?;
        validation::validate_ttl(ttl_ms)?;
        validation::validate_key(&key)?;
        validation::validate_owner_token(&owner_token)?;

        Ok(Self {
            adapter,
            key,
            ttl_ms,
            owner_token,
            retry_settings,
            state: LockState::Idle,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }

    pub fn retry_settings(&self) -> &RetrySettings {
        &self.retry_settings
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// Acquire the lock, retrying while the key is held by someone else
    ///
    /// Only `CreateFailed` is retried; any other adapter error aborts
    /// the loop and is returned unchanged.
    pub async fn acquire(&mut self) -> Result<()> {
        match self.state {
            LockState::Idle => {}
            LockState::Acquired => {
                return Err(LoccoError::illegal_state("lock is already acquired"));
            }
            LockState::Released => {
                return Err(LoccoError::illegal_state("can't acquire a released lock"));
            }
        }

        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let adapter = &self.adapter;
        let (key, owner_token, ttl_ms) = (self.key.as_str(), self.owner_token.as_str(), self.ttl_ms);

        let result = retry(
            &self.retry_settings,
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                adapter.create_lock(key, owner_token, ttl_ms)
            },
            LoccoError::is_create_failed,
        )
        .await;

        let attempts = attempts.into_inner();
        metrics::record_acquire(self.adapter.name(), result.is_ok(), attempts, started.elapsed());
        match result {
            Ok(()) => {
                self.state = LockState::Acquired;
                debug!(key = %self.key, attempts, "Lock acquired");
                Ok(())
            }
            Err(error) => {
                debug!(key = %self.key, attempts, error = %error, "Lock acquisition failed");
                Err(error)
            }
        }
    }

    /// Acquire the lock, run `work`, then release
    ///
    /// The release runs whether `work` succeeds or fails, and `work`'s
    /// own result is returned afterwards.
    ///
    /// ```rust,ignore
    /// let count = lock
    ///     .acquire_with(|lock| async move {
    ///         lock.extend(5_000).await?;
    ///         Ok::<_, LoccoError>(rebuild_index().await)
    ///     }.boxed())
    ///     .await?;
    /// ```
    pub async fn acquire_with<T, E, F>(&mut self, work: F) -> std::result::Result<T, E>
    where
        F: for<'a> FnOnce(&'a Lock) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: From<LoccoError>,
    {
        self.acquire().await?;
        let outcome = work(self).await;
        if let Err(error) = self.release(ReleaseOptions::default()).await {
            warn!(key = %self.key, error = %error, "Scoped release failed");
        }
        outcome
    }

    /// Release the lock
    ///
    /// Releasing twice is an error. Otherwise the handle becomes `Released`
    /// even when the adapter refuses, so a spent handle is never retried;
    /// the adapter's error is only returned with `throw_on_fail`.
    pub async fn release(&mut self, options: ReleaseOptions) -> Result<()> {
        if self.state == LockState::Released {
            return Err(LoccoError::illegal_state("can't release a lock twice"));
        }

        let result = self.adapter.release_lock(&self.key, &self.owner_token).await;
        self.state = LockState::Released;
        metrics::record_release(self.adapter.name(), result.is_ok());

        match result {
            Ok(()) => {
                debug!(key = %self.key, "Lock released");
                Ok(())
            }
            Err(error) if options.throw_on_fail => Err(error),
            Err(error) => {
                warn!(key = %self.key, error = %error, "Lock release failed, ignoring");
                Ok(())
            }
        }
    }

    /// Push the expiry of an acquired lock to `now + ttl_ms`
    pub async fn extend(&self, ttl_ms: u64) -> Result<()> {
        match self.state {
            LockState::Acquired => {}
            LockState::Idle => {
                return Err(LoccoError::illegal_state(
                    "can't extend a lock before it is acquired",
                ));
            }
            LockState::Released => {
                return Err(LoccoError::illegal_state("can't extend a released lock"));
            }
        }
        validation::validate_ttl(ttl_ms)?;

        let result = self
            .adapter
            .extend_lock(&self.key, &self.owner_token, ttl_ms)
            .await;
        metrics::record_extend(self.adapter.name(), result.is_ok());
        if result.is_ok() {
            debug!(key = %self.key, ttl_ms, "Lock extended");
        }
        result
    }

    /// Ask the backend whether this handle's token currently owns the key
    pub async fn is_locked(&self) -> Result<bool> {
        self.adapter
            .is_valid_lock(&self.key, &self.owner_token)
            .await
    }

    /// Clone this handle with different retry settings
    ///
    /// The clone shares adapter, key, TTL and owner token.
    pub fn with_retry_settings(&self, retry_settings: RetrySettings) -> Result<Lock> {
        if self.state != LockState::Idle {
            return Err(LoccoError::illegal_state(
                "can't change retry settings after the lock was acquired",
            ));
        }
        Self::with_owner_token(
            self.adapter.clone(),
            self.key.clone(),
            self.ttl_ms,
            retry_settings,
            self.owner_token.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAdapter;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::time::Duration;

    /// Adapter whose store is unreachable
    #[derive(Default)]
    struct UnreachableAdapter {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LockAdapter for UnreachableAdapter {
        async fn create_lock(&self, _key: &str, _owner_token: &str, _ttl_ms: u64) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LoccoError::backend(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }

        async fn release_lock(&self, _key: &str, _owner_token: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LoccoError::backend(std::io::Error::other("connection refused")))
        }

        async fn extend_lock(&self, _key: &str, _owner_token: &str, _ttl_ms: u64) -> Result<()> {
            Err(LoccoError::backend(std::io::Error::other("connection refused")))
        }

        async fn is_valid_lock(&self, _key: &str, _owner_token: &str) -> Result<bool> {
            Err(LoccoError::backend(std::io::Error::other("connection refused")))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    fn memory_lock(adapter: &Arc<MemoryAdapter>, key: &str, ttl_ms: u64) -> Lock {
        Lock::new(adapter.clone(), key, ttl_ms, RetrySettings::fixed(10, 10)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 1000);
        assert_eq!(lock.state(), LockState::Idle);

        lock.acquire().await.unwrap();
        assert_eq!(lock.state(), LockState::Acquired);
        assert!(lock.is_locked().await.unwrap());

        lock.release(ReleaseOptions::default()).await.unwrap();
        assert_eq!(lock.state(), LockState::Released);
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_twice_is_illegal() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 1000);
        lock.acquire().await.unwrap();

        let err = lock.acquire().await.unwrap_err();
        assert!(err.is_illegal_state());

        lock.release(ReleaseOptions::default()).await.unwrap();
        let err = lock.acquire().await.unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_twice_is_illegal() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 1000);
        lock.acquire().await.unwrap();
        lock.release(ReleaseOptions::default()).await.unwrap();

        let err = lock.release(ReleaseOptions::default()).await.unwrap_err();
        assert!(err.is_illegal_state());
        let err = lock.release(ReleaseOptions::throw_on_fail()).await.unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_release_is_swallowed_by_default() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut holder = memory_lock(&adapter, "key1", 1000);
        holder.acquire().await.unwrap();

        let mut other = memory_lock(&adapter, "key1", 1000);
        other.release(ReleaseOptions::default()).await.unwrap();
        assert_eq!(other.state(), LockState::Released);
        assert!(holder.is_locked().await.unwrap());

        let mut other = memory_lock(&adapter, "key1", 1000);
        let err = other.release(ReleaseOptions::throw_on_fail()).await.unwrap_err();
        assert!(err.is_release_failed());
        assert_eq!(other.state(), LockState::Released);
        assert!(holder.is_locked().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_guards() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 100);

        let err = lock.extend(300).await.unwrap_err();
        assert!(err.is_illegal_state());

        lock.acquire().await.unwrap();
        assert!(lock.extend(0).await.unwrap_err().is_validation());
        lock.extend(300).await.unwrap();

        lock.release(ReleaseOptions::default()).await.unwrap();
        let err = lock.extend(300).await.unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_expired_lock_fails() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 100);
        lock.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(110)).await;

        let err = lock.extend(300).await.unwrap_err();
        assert!(err.is_extend_failed());
        assert_eq!(lock.state(), LockState::Acquired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_settings_clones_identity() {
        let adapter = Arc::new(MemoryAdapter::new());
        let lock = memory_lock(&adapter, "key1", 1000);

        let clone = lock.with_retry_settings(RetrySettings::fixed(2, 5)).unwrap();
        assert_eq!(clone.key(), lock.key());
        assert_eq!(clone.ttl_ms(), lock.ttl_ms());
        assert_eq!(clone.owner_token(), lock.owner_token());
        assert_eq!(clone.retry_settings().retry_times, Some(2));

        let err = lock
            .with_retry_settings(RetrySettings {
                retry_delay_ms: Some(20),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_settings_after_acquire_is_illegal() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 1000);
        lock.acquire().await.unwrap();

        let err = lock
            .with_retry_settings(RetrySettings::fixed(2, 5))
            .unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_is_not_retried() {
        let adapter = Arc::new(UnreachableAdapter::default());
        let mut lock = Lock::new(adapter.clone(), "key1", 1000, RetrySettings::fixed(10, 10)).unwrap();

        let err = lock.acquire().await.unwrap_err();
        let inner = err.backend_error::<std::io::Error>().unwrap();
        assert_eq!(inner.kind(), std::io::ErrorKind::ConnectionRefused);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_with_releases_after_success() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 10_000);

        let value = lock
            .acquire_with(|lock| {
                async move {
                    assert!(lock.is_locked().await?);
                    lock.extend(20_000).await?;
                    Ok::<_, LoccoError>(7)
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(lock.state(), LockState::Released);
        assert!(adapter.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_with_releases_after_failure() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut lock = memory_lock(&adapter, "key1", 10_000);

        let err = lock
            .acquire_with(|_| {
                async { Err::<(), _>(LoccoError::validation("work failed")) }.boxed()
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "validation failed: work failed");
        assert_eq!(lock.state(), LockState::Released);

        let mut next = memory_lock(&adapter, "key1", 100)
            .with_retry_settings(RetrySettings::fixed(1, 20))
            .unwrap();
        next.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_with_surfaces_acquire_failure() {
        let adapter = Arc::new(MemoryAdapter::new());
        let mut holder = memory_lock(&adapter, "key1", 10_000);
        holder.acquire().await.unwrap();

        let mut lock = memory_lock(&adapter, "key1", 1000);
        let ran = AtomicU32::new(0);
        let err = lock
            .acquire_with(|_| {
                ran.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, LoccoError>(()) }.boxed()
            })
            .await
            .unwrap_err();

        assert!(err.is_retry_exhausted());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    fn test_invalid_construction() {
        let adapter: Arc<dyn LockAdapter> = Arc::new(UnreachableAdapter::default());
        let settings = RetrySettings::fixed(1, 1);

        assert!(Lock::new(adapter.clone(), "", 100, settings.clone()).unwrap_err().is_validation());
        assert!(Lock::new(adapter.clone(), "key", 0, settings.clone()).unwrap_err().is_validation());
        assert!(
            Lock::with_owner_token(adapter.clone(), "key", 100, settings, "")
                .unwrap_err()
                .is_validation()
        );
        assert!(
            Lock::new(adapter, "key", 100, RetrySettings::default())
                .unwrap_err()
                .is_validation()
        );
    }
}
