//! Locco Core - distributed locks over pluggable stores
//!
//! This crate provides:
//! - A retry engine with fixed or dynamic backoff and time budgets
//! - The `LockAdapter` contract backing stores implement
//! - An in-process adapter for tests and single-process use
//! - `Lock` handles with an explicit acquire/extend/release lifecycle
//! - `Locker`, a factory sharing one adapter and retry policy
//!
//! ```rust,ignore
//! let locker = Locker::new(Arc::new(MemoryAdapter::new()), RetrySettings::fixed(10, 50))?;
//! let mut lock = locker.lock("reports:daily", 30_000)?;
//! lock.acquire().await?;
//! // ... exclusive work ...
//! lock.release(ReleaseOptions::default()).await?;
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod lock;
pub mod locker;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod token;
pub mod validation;

#[cfg(any(test, feature = "conformance"))]
pub mod conformance;

pub use adapter::LockAdapter;
pub use config::LoccoConfig;
pub use error::{LoccoError, Result, RetryStop};
pub use lock::{Lock, LockState, ReleaseOptions};
pub use locker::Locker;
pub use memory::MemoryAdapter;
pub use retry::{DelayContext, DelayDecision, DelayFn, RetrySettings, retry};
