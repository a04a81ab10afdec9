//! Storage seam between the lock logic and the document collection
//!
//! [`MongoAdapter`](crate::MongoAdapter) speaks only in terms of
//! [`LockFilter`] and [`LockDocument`]; a [`LockDocumentStore`] turns those
//! into queries. The store must enforce uniqueness of `key`.

use async_trait::async_trait;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// One lock as stored in the collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockDocument {
    pub key: String,
    pub owner_token: String,
    pub expire_at: DateTime,
}

impl LockDocument {
    pub fn new(key: &str, owner_token: &str, expire_at: DateTime) -> Self {
        Self {
            key: key.to_string(),
            owner_token: owner_token.to_string(),
            expire_at,
        }
    }
}

/// Which side of `now` a record's expiry must fall on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryFilter {
    /// `expire_at <= now`, or no expiry at all
    Expired,
    /// `expire_at > now`
    Live,
}

/// Store-agnostic description of the records an operation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFilter {
    pub key: String,
    pub owner_token: Option<String>,
    pub expiry: ExpiryFilter,
    pub now: DateTime,
}

impl LockFilter {
    /// Records for `key` that no longer hold the lock
    pub fn expired(key: &str, now: DateTime) -> Self {
        Self {
            key: key.to_string(),
            owner_token: None,
            expiry: ExpiryFilter::Expired,
            now,
        }
    }

    /// The live record for `key` owned by `owner_token`
    pub fn held_by(key: &str, owner_token: &str, now: DateTime) -> Self {
        Self {
            key: key.to_string(),
            owner_token: Some(owner_token.to_string()),
            expiry: ExpiryFilter::Live,
            now,
        }
    }

    /// Evaluate the filter against a record in memory
    pub fn matches(&self, record: &LockDocument) -> bool {
        if record.key != self.key {
            return false;
        }
        if let Some(owner_token) = &self.owner_token
            && record.owner_token != *owner_token
        {
            return false;
        }
        match self.expiry {
            ExpiryFilter::Expired => record.expire_at <= self.now,
            ExpiryFilter::Live => record.expire_at > self.now,
        }
    }
}

/// Collection operations the document adapter needs
#[async_trait]
pub trait LockDocumentStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create the unique-key, TTL and query indexes; must be idempotent
    async fn ensure_indexes(&self) -> Result<(), Self::Error>;

    /// Overwrite the record matching `filter`, inserting `record` when none
    /// matches. Inserting over an existing key must fail with an error for
    /// which [`is_uniqueness_conflict`](Self::is_uniqueness_conflict) holds.
    async fn upsert_where(&self, filter: &LockFilter, record: &LockDocument)
    -> Result<(), Self::Error>;

    /// Overwrite the record matching `filter`; returns the number matched
    async fn update_where(&self, filter: &LockFilter, record: &LockDocument)
    -> Result<u64, Self::Error>;

    /// Delete the record matching `filter`; returns the number deleted
    async fn delete_where(&self, filter: &LockFilter) -> Result<u64, Self::Error>;

    async fn exists_where(&self, filter: &LockFilter) -> Result<bool, Self::Error>;

    fn is_uniqueness_conflict(&self, error: &Self::Error) -> bool;
}
