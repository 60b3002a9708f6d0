//! Metrics collection for `greenlight`.
//!
//! Prometheus-compatible metrics and typed convenience functions for
//! recording signal activity. Every recorder is a silent no-op until
//! [`init_metrics`] installs a global recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::GreenlightError;
use crate::phase::Phase;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Error categories accepted as labels; anything else is bucketed.
const KNOWN_ERROR_CATEGORIES: [&str; 4] = ["wait_timeout", "cycle_panic", "config", "observer"];

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `GreenlightError::Io` if the recorder or HTTP listener
/// cannot be installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), GreenlightError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| GreenlightError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!(
        "greenlight_phase_transitions_total",
        "Total number of phase transitions"
    );
    describe_gauge!(
        "greenlight_current_phase",
        "Currently shown phase (1 = active)"
    );
    describe_histogram!(
        "greenlight_phase_duration_ms",
        "Measured length of each completed phase in milliseconds"
    );
    describe_gauge!(
        "greenlight_waiters_active",
        "Number of callers blocked waiting for a phase"
    );
    describe_histogram!(
        "greenlight_wait_duration_ms",
        "Time callers spent blocked before their phase arrived"
    );
    describe_counter!(
        "greenlight_channel_overwrites_total",
        "Transitions displaced from the feed before being received"
    );
    describe_counter!(
        "greenlight_errors_total",
        "Total number of errors by category"
    );
}

/// Records a phase transition.
pub fn record_phase_transition(from: &'static str, to: &'static str) {
    counter!("greenlight_phase_transitions_total", "from" => from, "to" => to).increment(1);
}

/// Sets the current phase gauge, zeroing the previous phase's label.
pub fn set_current_phase(phase: Phase, previous: Option<Phase>) {
    if let Some(prev) = previous {
        gauge!("greenlight_current_phase", "phase" => prev.as_str()).set(0.0);
    }
    gauge!("greenlight_current_phase", "phase" => phase.as_str()).set(1.0);
}

/// Records how long a completed phase lasted.
pub fn record_phase_duration(duration: Duration) {
    histogram!("greenlight_phase_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Sets the number of blocked waiters.
#[allow(clippy::cast_precision_loss)]
pub fn set_waiters_active(count: usize) {
    gauge!("greenlight_waiters_active").set(count as f64);
}

/// Records how long a waiter was blocked.
pub fn record_wait_duration(duration: Duration) {
    histogram!("greenlight_wait_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Records transitions displaced from the feed.
pub fn record_channel_overwrites(count: u64) {
    counter!("greenlight_channel_overwrites_total").increment(count);
}

/// Records an error by category.
pub fn record_error(category: &str) {
    counter!("greenlight_errors_total", "category" => sanitize_error_category(category))
        .increment(1);
}

/// Maps a category to itself when known, `"__unknown__"` otherwise.
#[must_use]
pub fn sanitize_error_category(category: &str) -> &'static str {
    KNOWN_ERROR_CATEGORIES
        .iter()
        .find(|known| **known == category)
        .copied()
        .unwrap_or("__unknown__")
}
