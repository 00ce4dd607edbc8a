//! Observability module for the vote coordinator
//!
//! # Privacy by Default
//!
//! Actor loops use `#[instrument(skip_all)]` with explicit safe fields.
//! Payload contents are never logged, only their length. Metric labels are
//! bounded; client identities appear in logs but never in labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `vc_clients_registered` | Gauge | none | Live client sessions |
//! | `vc_connections_active` | Gauge | none | Open TCP connections |
//! | `vc_votes_total` | Counter | `result` | Vote outcomes |
//! | `vc_vote_latency_seconds` | Histogram | none | Vote handling time inside the coordinator |
//! | `vc_round_transitions_total` | Counter | `phase` | Applied round transitions |
//! | `vc_broadcasts_total` | Counter | `kind` | Broadcast jobs dispatched |
//! | `vc_broadcast_recipients_total` | Counter | `kind` | Sinks addressed by broadcasts |
//! | `vc_broadcast_dropped_total` | Counter | `kind` | Updates dropped on queue overflow |
//! | `vc_sink_write_failures_total` | Counter | `reason` | Failed client writes |
//! | `vc_dispatch_queue_depth` | Gauge | none | Backlog between coordinator and workers |
//! | `vc_actor_mailbox_depth` | Gauge | `actor_type` | Coordinator backpressure indicator |
//! | `vc_dispatch_latency_seconds` | Histogram | `kind` | Enqueue to last write |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, observability_router, HealthState};
pub use metrics::init_metrics_recorder;
