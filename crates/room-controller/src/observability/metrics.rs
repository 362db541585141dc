//! Metrics definitions for the Room Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for Room Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `actor_type`: 2 values (manager, room)
//! - `method`: 8 values (the RPC method names)
//! - `operation`: 8 values (the room operations)
//! - `reason`: bounded by `RcError::rejection_reason`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Worker creation spans a process spawn on the agent side
        .set_buckets_for_metric(
            Matcher::Full("rc_worker_creation_seconds".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set worker creation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Membership Gauges
// ============================================================================

/// Metric: `rc_rooms_active`
pub fn set_rooms_active(count: usize) {
    // usize to f64 conversion is safe for realistic room counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_rooms_active").set(count as f64);
}

/// Metric: `rc_publishers_active`
///
/// Publishers present across all rooms; pending publishers are not counted.
pub fn set_publishers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_publishers_active").set(count as f64);
}

/// Metric: `rc_subscribers_active`
///
/// Subscriber attachments across all rooms. A subscriber attached to two
/// publishers counts twice.
pub fn set_subscribers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_subscribers_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `rc_actor_mailbox_depth`
/// Labels: `actor_type` (manager, room)
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// RPC and Command Counters
// ============================================================================

/// Record an RPC call handed to the collaborator.
///
/// Metric: `rc_rpc_calls_total`
/// Labels: `method`
pub fn record_rpc_call(method: &str) {
    counter!("rc_rpc_calls_total", "method" => method.to_string()).increment(1);
}

/// Record a room operation rejected by its guard.
///
/// Metric: `rc_commands_rejected_total`
/// Labels: `operation`, `reason`
pub fn record_command_rejected(operation: &str, reason: &str) {
    counter!("rc_commands_rejected_total",
        "operation" => operation.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record the time from `createErizoJS` dispatch to its acknowledgement.
///
/// Metric: `rc_worker_creation_seconds`
pub fn record_worker_creation(duration: Duration) {
    histogram!("rc_worker_creation_seconds").record(duration.as_secs_f64());
}

/// Metric: `rc_worker_creation_failures_total`
pub fn record_worker_creation_failure() {
    counter!("rc_worker_creation_failures_total").increment(1);
}

/// Record an actor panic event.
///
/// Metric: `rc_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &str) {
    counter!("rc_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder goes to the global no-op
    // recorder; these only exercise the call paths.

    #[test]
    fn test_membership_gauges() {
        set_rooms_active(0);
        set_rooms_active(12);
        set_publishers_active(40);
        set_subscribers_active(400);
        set_actor_mailbox_depth("room", 3);
        set_actor_mailbox_depth("manager", 0);
    }

    #[test]
    fn test_counters_and_histograms() {
        record_rpc_call("createErizoJS");
        record_rpc_call("addSubscriber");
        record_command_rejected("add_subscriber", "not_an_offer");
        record_worker_creation(Duration::from_millis(120));
        record_worker_creation_failure();
        record_actor_panic("room");
    }
}
