//! Broadcast dispatch strategies.
//!
//! The coordinator produces a `DispatchJob` (immutable payload plus the
//! recipient sinks captured at that instant) and hands it to a `Dispatcher`:
//!
//! - `LockedSync` delivers inline, inside the coordinator. One stalled sink
//!   stalls every other coordinator operation until the write completes.
//! - `DecoupledAsync` pushes the job onto a bounded queue drained by worker
//!   tasks that never touch coordinator state. A stalled sink only holds
//!   the worker delivering to it.
//!
//! Delivery is best-effort in both: a failed write is logged, counted and
//! revokes that session, and delivery continues with the next sink.

use super::messages::BroadcastStatus;
use super::metrics::{CoordinatorMetrics, QueueKind, QueueMonitor};
use crate::errors::VcError;
use crate::observability::metrics as obs;
use crate::sink::{ClientSink, Payload, SinkError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What the queue does with a per-vote update when it is full.
///
/// Round announcements always wait for room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Suspend the coordinator until a worker frees a slot.
    Block,
    /// Discard the new update and count it.
    DropNewest,
}

impl OverflowPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropNewest => "drop",
        }
    }
}

/// Settings for the decoupled strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncDispatchSettings {
    pub queue_capacity: usize,
    pub workers: usize,
    pub overflow: OverflowPolicy,
    /// Per-write deadline; a sink that misses it is revoked.
    pub write_timeout: Option<Duration>,
}

impl Default for AsyncDispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            workers: 1,
            overflow: OverflowPolicy::Block,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Broadcast strategy, fixed when the coordinator is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    LockedSync,
    DecoupledAsync(AsyncDispatchSettings),
}

impl DispatchStrategy {
    /// Decoupled strategy with default settings.
    #[must_use]
    pub fn decoupled() -> Self {
        DispatchStrategy::DecoupledAsync(AsyncDispatchSettings::default())
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DispatchStrategy::LockedSync => "locked",
            DispatchStrategy::DecoupledAsync(_) => "async",
        }
    }
}

/// Broadcast category, used for eligibility, overflow and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    /// Per-vote tally; voters only.
    Update,
    /// Round started; everyone registered.
    RoundStarted,
    /// Round ended with the final tally; everyone registered.
    RoundEnded,
}

impl BroadcastKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BroadcastKind::Update => "update",
            BroadcastKind::RoundStarted => "round_started",
            BroadcastKind::RoundEnded => "round_ended",
        }
    }
}

/// One broadcast: a payload and the sinks it goes to.
#[derive(Debug)]
pub struct DispatchJob {
    pub kind: BroadcastKind,
    /// Coordinator sequence number; strictly increasing per job.
    pub seq: u64,
    pub payload: Payload,
    pub recipients: Vec<ClientSink>,
    pub created_at: Instant,
}

impl DispatchJob {
    #[must_use]
    pub fn new(
        kind: BroadcastKind,
        seq: u64,
        payload: Payload,
        recipients: Vec<ClientSink>,
    ) -> Self {
        Self {
            kind,
            seq,
            payload,
            recipients,
            created_at: Instant::now(),
        }
    }
}

/// Outcome of delivering one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Write `job` to every recipient in order.
///
/// Never aborts early: a failed sink is revoked and skipped.
pub async fn deliver(
    job: &DispatchJob,
    write_timeout: Option<Duration>,
    metrics: &CoordinatorMetrics,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for sink in &job.recipients {
        let payload = Arc::clone(&job.payload);
        let result = match write_timeout {
            Some(timeout) => sink.send_timeout(payload, timeout).await,
            None => sink.send(payload).await,
        };

        match result {
            Ok(()) => {
                report.delivered += 1;
                metrics.record_delivery();
            }
            Err(e) => {
                report.failed += 1;
                metrics.record_sink_write_failure();
                obs::record_sink_write_failure(e.as_str());

                let failure = VcError::SinkWriteFailure {
                    client_id: sink.identity().to_string(),
                    reason: e.as_str().to_string(),
                };
                if e == SinkError::Revoked {
                    debug!(
                        target: "vc.dispatch",
                        seq = job.seq,
                        kind = job.kind.as_str(),
                        error = %failure,
                        "Skipping revoked session"
                    );
                } else {
                    warn!(
                        target: "vc.dispatch",
                        seq = job.seq,
                        kind = job.kind.as_str(),
                        error = %failure,
                        "Broadcast delivery failed, revoking session"
                    );
                    sink.revoke();
                }
            }
        }
    }

    obs::record_dispatch_latency(job.kind.as_str(), job.created_at.elapsed());
    debug!(
        target: "vc.dispatch",
        seq = job.seq,
        kind = job.kind.as_str(),
        bytes = job.payload.len(),
        delivered = report.delivered,
        failed = report.failed,
        "Broadcast delivered"
    );

    report
}

struct WorkerPool {
    queue: mpsc::Sender<DispatchJob>,
    overflow: OverflowPolicy,
    monitor: Arc<QueueMonitor>,
    workers: Vec<JoinHandle<()>>,
}

enum DispatchMode {
    Locked,
    Decoupled(WorkerPool),
    Stopped,
}

/// Executes a `DispatchStrategy`. Owned by the coordinator actor.
pub struct Dispatcher {
    mode: DispatchMode,
    metrics: Arc<CoordinatorMetrics>,
}

impl Dispatcher {
    /// Create the dispatcher, spawning workers for the decoupled strategy.
    #[must_use]
    pub fn new(strategy: DispatchStrategy, metrics: Arc<CoordinatorMetrics>) -> Self {
        let mode = match strategy {
            DispatchStrategy::LockedSync => DispatchMode::Locked,
            DispatchStrategy::DecoupledAsync(settings) => {
                DispatchMode::Decoupled(Self::spawn_pool(settings, &metrics))
            }
        };
        Self { mode, metrics }
    }

    fn spawn_pool(
        settings: AsyncDispatchSettings,
        metrics: &Arc<CoordinatorMetrics>,
    ) -> WorkerPool {
        let capacity = settings.queue_capacity.max(1);
        let (queue, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let monitor = Arc::new(QueueMonitor::new(QueueKind::Dispatch, capacity));

        let workers = (0..settings.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    settings.write_timeout,
                    Arc::clone(&monitor),
                    Arc::clone(metrics),
                ))
            })
            .collect();

        info!(
            target: "vc.dispatch",
            queue_capacity = settings.queue_capacity,
            workers = settings.workers,
            overflow = settings.overflow.as_str(),
            write_timeout_ms = settings.write_timeout.map(|t| t.as_millis()),
            "Dispatch workers started"
        );

        WorkerPool {
            queue,
            overflow: settings.overflow,
            monitor,
            workers,
        }
    }

    /// Whether jobs are delivered inside the caller.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.mode, DispatchMode::Locked)
    }

    /// Deliver or enqueue `job` according to the strategy.
    pub async fn dispatch(&self, job: DispatchJob) -> BroadcastStatus {
        let kind = job.kind;
        let recipients = job.recipients.len();

        match &self.mode {
            DispatchMode::Locked => {
                obs::record_broadcast(kind.as_str(), recipients);
                self.metrics.record_broadcast_dispatched();
                deliver(&job, None, &self.metrics).await;
                BroadcastStatus::Inline
            }
            DispatchMode::Decoupled(pool) => {
                let status = self.enqueue(pool, job).await;
                if status == BroadcastStatus::Queued {
                    obs::record_broadcast(kind.as_str(), recipients);
                    self.metrics.record_broadcast_dispatched();
                }
                status
            }
            DispatchMode::Stopped => {
                debug!(
                    target: "vc.dispatch",
                    kind = kind.as_str(),
                    "Dispatcher stopped, discarding broadcast"
                );
                BroadcastStatus::Dropped
            }
        }
    }

    async fn enqueue(&self, pool: &WorkerPool, job: DispatchJob) -> BroadcastStatus {
        let kind = job.kind;
        let job = match pool.queue.try_send(job) {
            Ok(()) => None,
            Err(mpsc::error::TrySendError::Full(job)) => Some(job),
            Err(mpsc::error::TrySendError::Closed(_)) => return BroadcastStatus::Dropped,
        };

        if let Some(job) = job {
            if pool.overflow == OverflowPolicy::DropNewest && kind == BroadcastKind::Update {
                pool.monitor.record_discarded();
                self.metrics.record_broadcast_dropped();
                obs::record_broadcast_dropped(kind.as_str());
                return BroadcastStatus::Dropped;
            }

            warn!(
                target: "vc.dispatch",
                seq = job.seq,
                kind = kind.as_str(),
                "Dispatch queue full, waiting for a worker"
            );
            if pool.queue.send(job).await.is_err() {
                return BroadcastStatus::Dropped;
            }
        }

        pool.monitor.observe(pool.queue.max_capacity() - pool.queue.capacity());
        BroadcastStatus::Queued
    }

    /// Stop accepting jobs, let workers drain the queue, and wait for them
    /// up to `deadline`. Workers still busy after that are aborted.
    pub async fn shutdown(&mut self, deadline: Duration) {
        let DispatchMode::Decoupled(pool) = std::mem::replace(&mut self.mode, DispatchMode::Stopped)
        else {
            return;
        };

        let WorkerPool {
            queue,
            monitor,
            workers,
            ..
        } = pool;
        drop(queue);

        let pending = monitor.depth();
        info!(
            target: "vc.dispatch",
            pending_jobs = pending,
            "Draining dispatch queue"
        );

        let abort_handles: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(deadline, futures::future::join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(target: "vc.dispatch", error = ?e, "Dispatch worker panicked");
                    }
                }
                info!(
                    target: "vc.dispatch",
                    processed = monitor.processed(),
                    dropped = monitor.discarded(),
                    peak_depth = monitor.high_water(),
                    "Dispatch queue drained"
                );
            }
            Err(_) => {
                warn!(
                    target: "vc.dispatch",
                    remaining = monitor.depth(),
                    "Dispatch drain timed out, aborting workers"
                );
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    write_timeout: Option<Duration>,
    monitor: Arc<QueueMonitor>,
    metrics: Arc<CoordinatorMetrics>,
) {
    debug!(target: "vc.dispatch", worker_id, "Dispatch worker started");

    loop {
        // The lock is only held while waiting for the next job, never
        // across a delivery.
        let job = {
            let mut receiver = queue.lock().await;
            let job = receiver.recv().await;
            monitor.observe(receiver.len());
            job
        };
        let Some(job) = job else {
            break;
        };

        deliver(&job, write_timeout, &metrics).await;
        monitor.record_processed();
    }

    debug!(target: "vc.dispatch", worker_id, "Dispatch worker stopped");
}
