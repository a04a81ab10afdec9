//! Input validation shared by locks and adapters

use crate::error::{LoccoError, Result};

/// Largest TTL every backend can represent as signed milliseconds
pub const MAX_TTL_MS: u64 = i64::MAX as u64;

pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LoccoError::validation(
            "key should be a string with at least one character",
        ));
    }
    Ok(())
}

pub fn validate_owner_token(owner_token: &str) -> Result<()> {
    if owner_token.is_empty() {
        return Err(LoccoError::validation(
            "owner token should be a string with at least one character",
        ));
    }
    Ok(())
}

pub fn validate_ttl(ttl_ms: u64) -> Result<()> {
    if ttl_ms == 0 {
        return Err(LoccoError::validation("ttl should be a positive integer"));
    }
    if ttl_ms > MAX_TTL_MS {
        return Err(LoccoError::validation(format!(
            "ttl should not exceed {} ms",
            MAX_TTL_MS
        )));
    }
    Ok(())
}

/// Validate the arguments of `createLock` / `extendLock`
pub fn validate_lock_request(key: &str, owner_token: &str, ttl_ms: u64) -> Result<()> {
    validate_key(key)?;
    validate_owner_token(owner_token)?;
    validate_ttl(ttl_ms)
}

/// Validate the arguments of `releaseLock` / `isValidLock`
pub fn validate_owner_request(key: &str, owner_token: &str) -> Result<()> {
    validate_key(key)?;
    validate_owner_token(owner_token)
}
