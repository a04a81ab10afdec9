//! Locco Redis - key-value store adapter for Locco distributed locks
//!
//! Each lock is one Redis string: key -> owner token, expiring after the TTL.
//!
//! ```rust,ignore
//! let adapter = RedisAdapter::connect("redis://127.0.0.1/").await?;
//! let locker = Locker::with_default_retry(Arc::new(adapter));
//! let mut lock = locker.lock("invoices:close", 10_000)?;
//! lock.acquire().await?;
//! ```

mod adapter;
pub mod scripts;

pub use adapter::RedisAdapter;
