//! Backing-store adapter contract
//!
//! Every store integration implements [`LockAdapter`]. Implementations must
//! uphold the following, which `crate::conformance` checks:
//!
//! - `create_lock` succeeds iff no live record exists for `key` at the moment
//!   of an atomic check. On success it installs `owner_token` with expiry
//!   `now + ttl_ms`, whoever owned the previous expired record. Of several
//!   callers racing on one absent or expired key, exactly one succeeds.
//! - `release_lock` succeeds iff a live record for `key` is owned by
//!   `owner_token`, and removes it. Otherwise it fails without side effects.
//! - `extend_lock` succeeds iff a live record for `key` is owned by
//!   `owner_token`, and resets its expiry to `now + ttl_ms`. An expired
//!   record is never revived.
//! - `is_valid_lock` never mutates.
//! - Empty keys, empty tokens and zero TTLs are rejected with
//!   [`LoccoError::Validation`], before touching the store.
//! - Store errors surface as [`LoccoError::Backend`] carrying the driver
//!   error itself.
//!
//! [`LoccoError::Validation`]: crate::error::LoccoError::Validation
//! [`LoccoError::Backend`]: crate::error::LoccoError::Backend

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LockAdapter: Send + Sync {
    /// Install a record for `key`, failing with `CreateFailed` if one is live
    async fn create_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()>;

    /// Remove the live record owned by `owner_token`, or fail with `ReleaseFailed`
    async fn release_lock(&self, key: &str, owner_token: &str) -> Result<()>;

    /// Reset the expiry of the live record owned by `owner_token`, or fail with `ExtendFailed`
    async fn extend_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()>;

    /// Whether a live record for `key` is owned by `owner_token`
    async fn is_valid_lock(&self, key: &str, owner_token: &str) -> Result<bool>;

    /// Short backend name used in logs and metrics labels
    fn name(&self) -> &'static str;
}
