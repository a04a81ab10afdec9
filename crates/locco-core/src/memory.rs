//! In-process lock store
//!
//! Records live in a `DashMap` owned by the adapter instance, so two
//! adapters never share state. Each record carries a cleanup task that
//! deletes it once its TTL elapses, provided owner and expiry still match.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::adapter::LockAdapter;
use crate::error::{LoccoError, Result};
use crate::metrics;
use crate::validation;

struct LockRecord {
    owner_token: String,
    expire_at: Instant,
    cleanup: AbortHandle,
}

impl LockRecord {
    fn is_live(&self, now: Instant) -> bool {
        self.expire_at > now
    }

    fn is_held_by(&self, owner_token: &str, now: Instant) -> bool {
        self.is_live(now) && self.owner_token == owner_token
    }
}

type LockTable = DashMap<String, LockRecord>;

/// Lock adapter keeping records in process memory
pub struct MemoryAdapter {
    locks: Arc<LockTable>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Number of records currently stored, expired ones not yet cleaned up included
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn expire_at(now: Instant, ttl_ms: u64) -> Result<Instant> {
        now.checked_add(Duration::from_millis(ttl_ms))
            .ok_or_else(|| LoccoError::validation("ttl is too large for this clock"))
    }

    fn new_record(&self, key: &str, owner_token: &str, expire_at: Instant) -> LockRecord {
        LockRecord {
            owner_token: owner_token.to_string(),
            expire_at,
            cleanup: schedule_cleanup(
                Arc::downgrade(&self.locks),
                key.to_string(),
                owner_token.to_string(),
                expire_at,
            ),
        }
    }
}

impl Drop for MemoryAdapter {
    fn drop(&mut self) {
        for record in self.locks.iter() {
            record.cleanup.abort();
        }
    }
}

/// Delete the record at `expire_at` unless it was replaced or extended meanwhile
fn schedule_cleanup(
    locks: Weak<LockTable>,
    key: String,
    owner_token: String,
    expire_at: Instant,
) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep_until(expire_at).await;
        let Some(locks) = locks.upgrade() else {
            return;
        };
        let removed = locks.remove_if(&key, |_, record| {
            record.owner_token == owner_token && record.expire_at == expire_at
        });
        if removed.is_some() {
            debug!(key = %key, "Expired lock record cleaned up");
            metrics::set_memory_locks(locks.len());
        }
    })
    .abort_handle()
}

#[async_trait]
impl LockAdapter for MemoryAdapter {
    async fn create_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()> {
        validation::validate_lock_request(key, owner_token, ttl_ms)?;
        let now = Instant::now();
        let expire_at = Self::expire_at(now, ttl_ms)?;

        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    return Err(LoccoError::CreateFailed {
                        key: key.to_string(),
                    });
                }
                let previous = entry.insert(self.new_record(key, owner_token, expire_at));
                previous.cleanup.abort();
            }
            Entry::Vacant(entry) => {
                entry.insert(self.new_record(key, owner_token, expire_at));
            }
        }

        metrics::set_memory_locks(self.locks.len());
        Ok(())
    }

    async fn release_lock(&self, key: &str, owner_token: &str) -> Result<()> {
        validation::validate_owner_request(key, owner_token)?;
        let now = Instant::now();

        match self
            .locks
            .remove_if(key, |_, record| record.is_held_by(owner_token, now))
        {
            Some((_, record)) => {
                record.cleanup.abort();
                metrics::set_memory_locks(self.locks.len());
                Ok(())
            }
            None => {
                debug!(key = %key, "Release refused: lock is expired or taken");
                Err(LoccoError::ReleaseFailed {
                    key: key.to_string(),
                })
            }
        }
    }

    async fn extend_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()> {
        validation::validate_lock_request(key, owner_token, ttl_ms)?;
        let now = Instant::now();
        let expire_at = Self::expire_at(now, ttl_ms)?;

        match self.locks.get_mut(key) {
            Some(mut record) if record.is_held_by(owner_token, now) => {
                let cleanup = schedule_cleanup(
                    Arc::downgrade(&self.locks),
                    key.to_string(),
                    owner_token.to_string(),
                    expire_at,
                );
                let previous = std::mem::replace(&mut record.cleanup, cleanup);
                record.expire_at = expire_at;
                previous.abort();
                Ok(())
            }
            _ => Err(LoccoError::ExtendFailed {
                key: key.to_string(),
            }),
        }
    }

    async fn is_valid_lock(&self, key: &str, owner_token: &str) -> Result<bool> {
        validation::validate_owner_request(key, owner_token)?;
        let now = Instant::now();
        Ok(self
            .locks
            .get(key)
            .is_some_and(|record| record.is_held_by(owner_token, now)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
