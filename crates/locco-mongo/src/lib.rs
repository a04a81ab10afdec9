//! Locco Mongo - document store adapter for Locco distributed locks
//!
//! Each lock is one document `{ key, ownerToken, expireAt }` in a collection
//! with a unique index on `key` and a TTL index on `expireAt`.
//!
//! ```rust,ignore
//! let client = mongodb::Client::with_uri_str("mongodb://127.0.0.1/jobs").await?;
//! let adapter = MongoAdapter::new(&client, MongoAdapterConfig::default())?;
//! let locker = Locker::with_default_retry(Arc::new(adapter));
//! ```

mod adapter;
pub mod mongo;
pub mod store;

pub use adapter::{MongoAdapter, MongoAdapterConfig};
pub use mongo::{MongoLockStore, is_duplicate_key_error};
pub use store::{ExpiryFilter, LockDocument, LockDocumentStore, LockFilter};
