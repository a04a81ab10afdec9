//! Retry engine driving lock acquisition under contention
//!
//! `retry` runs an operation until it succeeds or a stop condition is hit:
//! - `total_time_ms` elapsed before the next attempt
//! - `retry_times` attempts made
//! - the delay policy returned [`DelayDecision::Stop`]
//!
//! Attempts are strictly sequential. The only suspension point is the
//! backoff delay between two attempts.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{LoccoError, Result, RetryStop};

/// Outcome of a delay policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayDecision {
    /// Wait this many milliseconds, then try again
    Continue(u64),
    /// Give up with the given reason
    Stop(String),
}

impl DelayDecision {
    pub fn stop() -> Self {
        Self::Stop(String::new())
    }
}

/// Input handed to a delay policy after a failed attempt
#[derive(Debug)]
pub struct DelayContext<'a> {
    /// Zero-based number of the attempt that just failed
    pub attempt_number: u32,
    pub started_at: Instant,
    /// Delay used before the failed attempt, if any
    pub previous_delay_ms: Option<u64>,
    pub settings: &'a RetrySettings,
}

impl DelayContext<'_> {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Dynamic delay policy
pub type DelayFn = Arc<dyn Fn(&DelayContext<'_>) -> DelayDecision + Send + Sync>;

/// Retry configuration
///
/// Exactly one of `retry_delay_ms` and `delay_fn` must be set. A fixed
/// delay also needs `retry_times`; a delay policy may run unbounded or be
/// capped by `retry_times` and/or `total_time_ms`.
#[derive(Clone, Default)]
pub struct RetrySettings {
    /// Maximum number of attempts; `0` and `1` both mean a single attempt
    pub retry_times: Option<u32>,
    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: Option<u64>,
    pub delay_fn: Option<DelayFn>,
    /// Wall-clock budget in milliseconds
    pub total_time_ms: Option<u64>,
}

impl fmt::Debug for RetrySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySettings")
            .field("retry_times", &self.retry_times)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("delay_fn", &self.delay_fn.as_ref().map(|_| "<fn>"))
            .field("total_time_ms", &self.total_time_ms)
            .finish()
    }
}

impl RetrySettings {
    /// `retry_times` attempts spaced `retry_delay_ms` apart
    pub fn fixed(retry_times: u32, retry_delay_ms: u64) -> Self {
        Self {
            retry_times: Some(retry_times),
            retry_delay_ms: Some(retry_delay_ms),
            ..Default::default()
        }
    }

    /// Delays computed by `delay_fn` after every failed attempt
    pub fn with_delay_fn<F>(delay_fn: F) -> Self
    where
        F: Fn(&DelayContext<'_>) -> DelayDecision + Send + Sync + 'static,
    {
        Self {
            delay_fn: Some(Arc::new(delay_fn)),
            ..Default::default()
        }
    }

    /// Cap the number of attempts
    pub fn retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = Some(retry_times);
        self
    }

    /// Bound the whole retry loop by a wall-clock budget
    pub fn total_time(mut self, total_time_ms: u64) -> Self {
        self.total_time_ms = Some(total_time_ms);
        self
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.delay_fn, self.retry_delay_ms) {
            (Some(_), Some(_)) => Err(LoccoError::validation(
                "can't have both delay_fn and retry_delay",
            )),
            (None, None) | (None, Some(_)) if self.retry_times.is_none() => {
                Err(LoccoError::validation(
                    "retry_times and retry_delay should be specified if delay_fn is not provided",
                ))
            }
            (None, None) => Err(LoccoError::validation(
                "retry_delay should be specified if delay_fn is not provided",
            )),
            _ => Ok(()),
        }
    }

    fn next_delay(&self, ctx: &DelayContext<'_>) -> DelayDecision {
        match &self.delay_fn {
            Some(delay_fn) => delay_fn(ctx),
            None => DelayDecision::Continue(self.retry_delay_ms.unwrap_or(0)),
        }
    }
}

/// Run `operation` until it succeeds or the settings say stop
///
/// An error for which `should_proceed` returns `false` is returned as-is,
/// so callers can tell a non-retryable failure from an exhausted budget.
pub async fn retry<T, F, Fut, P>(
    settings: &RetrySettings,
    mut operation: F,
    should_proceed: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&LoccoError) -> bool,
{
    settings.validate()?;

    let started_at = Instant::now();
    let total_time = settings.total_time_ms.map(Duration::from_millis);
    let mut attempt_number: u32 = 0;
    let mut previous_delay_ms = None;

    loop {
        if let Some(total_time) = total_time
            && started_at.elapsed() >= total_time
        {
            debug!(attempt_number, "Retry total time exceeded");
            return Err(LoccoError::RetryExhausted(RetryStop::TotalTimeExceeded));
        }

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !should_proceed(&error) {
            return Err(error);
        }

        if let Some(retry_times) = settings.retry_times
            && attempt_number.saturating_add(1) >= retry_times
        {
            debug!(attempt_number, retry_times, "Retry times limit reached");
            return Err(LoccoError::RetryExhausted(RetryStop::RetryTimesReached));
        }

        let ctx = DelayContext {
            attempt_number,
            started_at,
            previous_delay_ms,
            settings,
        };
        let delay_ms = match settings.next_delay(&ctx) {
            DelayDecision::Continue(delay_ms) => delay_ms,
            DelayDecision::Stop(reason) => {
                debug!(attempt_number, reason = %reason, "Retry stopped by delay policy");
                return Err(LoccoError::RetryExhausted(RetryStop::Stopped(reason)));
            }
        };

        debug!(attempt_number, delay_ms, error = %error, "Attempt failed, retrying");
        if delay_ms == 0 {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        previous_delay_ms = Some(delay_ms);
        attempt_number = attempt_number.saturating_add(1);
    }
}
