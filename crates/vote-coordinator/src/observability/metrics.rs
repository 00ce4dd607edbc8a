//! Metrics definitions for the vote coordinator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `vc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `result`: `accepted` plus the `VcError::reason()` labels (~12 values)
//! - `kind`: 3 values (update, round_started, round_ended)
//! - `reason`: 4 values (closed, timed_out, revoked, full)
//! - `actor_type`: 2 values (coordinator, dispatch_queue)
//! - `phase`: 3 values (not_started, active, ended)
//!
//! Client identities are never used as label values.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Dispatch latency: enqueue to last sink write, slow sinks push this into seconds
        .set_buckets_for_metric(
            Matcher::Prefix("vc_dispatch".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
                10.000,
            ],
        )
        .map_err(|e| format!("Failed to set dispatch latency buckets: {e}"))?
        // Vote latency: time from mailbox receive to reply
        .set_buckets_for_metric(
            Matcher::Prefix("vc_vote".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set vote latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Client Metrics (Gauges)
// ============================================================================

/// Set the number of registered client sessions.
///
/// Metric: `vc_clients_registered`
/// Labels: none
pub fn set_clients_registered(count: usize) {
    // usize to f64 conversion is safe for realistic client counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("vc_clients_registered").set(count as f64);
}

/// Record a TCP connection being accepted.
///
/// Metric: `vc_connections_active`
/// Labels: none
pub fn record_connection_opened() {
    gauge!("vc_connections_active").increment(1.0);
}

/// Record a TCP connection closing.
///
/// Metric: `vc_connections_active`
/// Labels: none
pub fn record_connection_closed() {
    gauge!("vc_connections_active").decrement(1.0);
}

// ============================================================================
// Vote Metrics
// ============================================================================

/// Record a vote outcome.
///
/// Metric: `vc_votes_total`
/// Labels: `result` (`accepted` or an error reason)
///
/// Cardinality: ~12 (bounded by `VcError::reason()`)
pub fn record_vote(result: &'static str) {
    counter!("vc_votes_total", "result" => result).increment(1);
}

/// Record time spent handling a vote inside the coordinator.
///
/// Metric: `vc_vote_latency_seconds`
/// Labels: none
pub fn record_vote_latency(duration: Duration) {
    histogram!("vc_vote_latency_seconds").record(duration.as_secs_f64());
}

/// Record a round phase transition.
///
/// Metric: `vc_round_transitions_total`
/// Labels: `phase` (the phase entered)
pub fn record_round_transition(phase: &'static str) {
    counter!("vc_round_transitions_total", "phase" => phase).increment(1);
}

// ============================================================================
// Dispatch Metrics
// ============================================================================

/// Record a broadcast handed to the dispatcher.
///
/// Metric: `vc_broadcasts_total`, `vc_broadcast_recipients_total`
/// Labels: `kind`
///
/// Cardinality: 3 (bounded by `BroadcastKind`)
pub fn record_broadcast(kind: &'static str, recipients: usize) {
    counter!("vc_broadcasts_total", "kind" => kind).increment(1);
    counter!("vc_broadcast_recipients_total", "kind" => kind).increment(recipients as u64);
}

/// Record a broadcast discarded by the drop overflow policy.
///
/// Metric: `vc_broadcast_dropped_total`
/// Labels: `kind`
pub fn record_broadcast_dropped(kind: &'static str) {
    counter!("vc_broadcast_dropped_total", "kind" => kind).increment(1);
}

/// Record a failed sink write.
///
/// Metric: `vc_sink_write_failures_total`
/// Labels: `reason` (closed, timed_out, revoked, full)
pub fn record_sink_write_failure(reason: &'static str) {
    counter!("vc_sink_write_failures_total", "reason" => reason).increment(1);
}

/// Record end-to-end delivery time of one broadcast job.
///
/// Metric: `vc_dispatch_latency_seconds`
/// Labels: `kind`
pub fn record_dispatch_latency(kind: &'static str, duration: Duration) {
    histogram!("vc_dispatch_latency_seconds", "kind" => kind).record(duration.as_secs_f64());
}

/// Set the dispatch queue depth.
///
/// Metric: `vc_dispatch_queue_depth`
/// Labels: none
pub fn set_dispatch_queue_depth(depth: usize) {
    // usize to f64 conversion is safe for realistic queue depths
    #[allow(clippy::cast_precision_loss)]
    gauge!("vc_dispatch_queue_depth").set(depth as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `vc_actor_mailbox_depth`
/// Labels: `actor_type` (coordinator, dispatch_queue)
///
/// High values indicate the coordinator is falling behind, which is what a
/// stalled locked-mode broadcast looks like from the outside.
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    // usize to f64 conversion is safe for realistic mailbox depths
    #[allow(clippy::cast_precision_loss)]
    gauge!("vc_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}
