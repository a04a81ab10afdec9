// Metrics for lock operations
// Records through the `metrics` facade; installing an exporter is up to the application

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(
        "locco_lock_acquire_total",
        "Total number of lock acquisitions by outcome"
    );
    describe_histogram!(
        "locco_lock_acquire_attempts",
        "Number of adapter calls made per acquisition"
    );
    describe_histogram!(
        "locco_lock_acquire_duration_seconds",
        "Time spent acquiring a lock, retries included"
    );
    describe_counter!(
        "locco_lock_release_total",
        "Total number of lock releases by outcome"
    );
    describe_counter!(
        "locco_lock_extend_total",
        "Total number of lock extensions by outcome"
    );
    describe_gauge!(
        "locco_memory_locks",
        "Number of records held by in-process adapters"
    );

    tracing::info!("Locco metrics initialized");
}

fn outcome(success: bool) -> &'static str {
    if success { "success" } else { "failure" }
}

/// Record a finished acquisition
pub fn record_acquire(adapter: &'static str, success: bool, attempts: u32, elapsed: Duration) {
    counter!("locco_lock_acquire_total", "adapter" => adapter, "outcome" => outcome(success))
        .increment(1);
    histogram!("locco_lock_acquire_attempts", "adapter" => adapter).record(f64::from(attempts));
    histogram!("locco_lock_acquire_duration_seconds", "adapter" => adapter)
        .record(elapsed.as_secs_f64());
}

/// Record a release attempt
pub fn record_release(adapter: &'static str, success: bool) {
    counter!("locco_lock_release_total", "adapter" => adapter, "outcome" => outcome(success))
        .increment(1);
}

/// Record an extension attempt
pub fn record_extend(adapter: &'static str, success: bool) {
    counter!("locco_lock_extend_total", "adapter" => adapter, "outcome" => outcome(success))
        .increment(1);
}

/// Update the in-process record count
pub fn set_memory_locks(count: usize) {
    gauge!("locco_memory_locks").set(count as f64);
}
