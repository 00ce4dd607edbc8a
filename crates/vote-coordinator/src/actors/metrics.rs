//! In-process counters for the coordinator and its queues.
//!
//! Queue pressure is relative to capacity: below a quarter full is `Low`,
//! from a quarter to three quarters is `Elevated`, above that `Saturated`.
//! Depth is sampled from the channel itself, so senders never touch the
//! monitor.
//!
//! Prometheus emission lives in `observability::metrics`; the atomics here
//! are the view used by status queries and tests.

use crate::observability::metrics as obs;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// A monitored queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Coordinator actor mailbox.
    Coordinator,
    /// Broadcast jobs waiting for a dispatch worker.
    Dispatch,
}

impl QueueKind {
    /// Metric label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            QueueKind::Coordinator => "coordinator",
            QueueKind::Dispatch => "dispatch_queue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pressure {
    Low,
    Elevated,
    Saturated,
}

/// Depth sampler for one bounded channel.
#[derive(Debug)]
pub struct QueueMonitor {
    kind: QueueKind,
    capacity: usize,
    depth: AtomicUsize,
    high_water: AtomicUsize,
    processed: AtomicU64,
    discarded: AtomicU64,
    saturated: AtomicBool,
}

impl QueueMonitor {
    #[must_use]
    pub fn new(kind: QueueKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            depth: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            saturated: AtomicBool::new(false),
        }
    }

    /// Record the channel's current length and publish it as a gauge.
    ///
    /// Logs once when the queue becomes saturated and once when it recovers,
    /// not on every sample.
    pub fn observe(&self, depth: usize) -> Pressure {
        self.depth.store(depth, Ordering::Relaxed);
        self.high_water.fetch_max(depth, Ordering::Relaxed);

        match self.kind {
            QueueKind::Coordinator => obs::set_actor_mailbox_depth(self.kind.label(), depth),
            QueueKind::Dispatch => obs::set_dispatch_queue_depth(depth),
        }

        let pressure = self.pressure_at(depth);
        let now_saturated = pressure == Pressure::Saturated;
        if self.saturated.swap(now_saturated, Ordering::Relaxed) != now_saturated {
            if now_saturated {
                warn!(
                    target: "vc.actor.metrics",
                    queue = self.kind.label(),
                    depth,
                    capacity = self.capacity,
                    "Queue saturated"
                );
            } else {
                info!(
                    target: "vc.actor.metrics",
                    queue = self.kind.label(),
                    depth,
                    "Queue recovered"
                );
            }
        }
        pressure
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Last sampled depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pressure(&self) -> Pressure {
        self.pressure_at(self.depth())
    }

    fn pressure_at(&self, depth: usize) -> Pressure {
        let scaled = depth.saturating_mul(4);
        if scaled > self.capacity.saturating_mul(3) {
            Pressure::Saturated
        } else if scaled >= self.capacity {
            Pressure::Elevated
        } else {
            Pressure::Low
        }
    }
}

/// Coordinator counters shared between the actor, the dispatch workers
/// and whoever holds the handle.
///
/// All fields are atomic for lock-free concurrent access.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    registered_clients: AtomicUsize,
    votes_accepted: AtomicU64,
    votes_rejected: AtomicU64,
    broadcasts_dispatched: AtomicU64,
    broadcasts_dropped: AtomicU64,
    deliveries_succeeded: AtomicU64,
    sink_write_failures: AtomicU64,
}

/// Snapshot of coordinator metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorMetricsSnapshot {
    pub registered_clients: usize,
    pub votes_accepted: u64,
    pub votes_rejected: u64,
    /// Broadcast jobs handed to the dispatcher (inline or queued).
    pub broadcasts_dispatched: u64,
    /// Update broadcasts discarded by the drop overflow policy.
    pub broadcasts_dropped: u64,
    /// Individual sink writes that succeeded.
    pub deliveries_succeeded: u64,
    /// Individual sink writes that failed or timed out.
    pub sink_write_failures: u64,
}

impl CoordinatorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_registered_clients(&self, count: usize) {
        self.registered_clients.store(count, Ordering::SeqCst);
    }

    pub fn record_vote_accepted(&self) {
        self.votes_accepted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_vote_rejected(&self) {
        self.votes_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_broadcast_dispatched(&self) {
        self.broadcasts_dispatched.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_broadcast_dropped(&self) {
        self.broadcasts_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_delivery(&self) {
        self.deliveries_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_sink_write_failure(&self) {
        self.sink_write_failures.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn registered_clients(&self) -> usize {
        self.registered_clients.load(Ordering::SeqCst)
    }

    /// Take a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> CoordinatorMetricsSnapshot {
        CoordinatorMetricsSnapshot {
            registered_clients: self.registered_clients.load(Ordering::SeqCst),
            votes_accepted: self.votes_accepted.load(Ordering::SeqCst),
            votes_rejected: self.votes_rejected.load(Ordering::SeqCst),
            broadcasts_dispatched: self.broadcasts_dispatched.load(Ordering::SeqCst),
            broadcasts_dropped: self.broadcasts_dropped.load(Ordering::SeqCst),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::SeqCst),
            sink_write_failures: self.sink_write_failures.load(Ordering::SeqCst),
        }
    }
}
