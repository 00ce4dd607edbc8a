//! Actor model implementation for the vote coordinator.
//!
//! ```text
//! CoordinatorActor (singleton per process)
//! ├── owns ClientRegistry, VoteLedger, VotingRound
//! └── Dispatcher
//!     ├── locked: writes every sink inside the actor
//!     └── decoupled: bounded job queue -> N dispatch workers -> client sinks
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single owner**: All vote state lives in one actor; everything else sees snapshots
//! - **CancellationToken propagation**: Connections hold child tokens for graceful shutdown
//! - **Queue monitoring**: sampled depth and capacity-relative pressure per queue
//! - **Message passing**: All communication via `tokio::sync::mpsc` channels
//!
//! # Modules
//!
//! - [`coordinator`] - `CoordinatorActor` and its handle
//! - [`dispatch`] - Broadcast strategies and the dispatch worker pool
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Queue monitoring and coordinator counters

pub mod coordinator;
pub mod dispatch;
pub mod messages;
pub mod metrics;

// Re-export primary types
pub use coordinator::{CoordinatorActor, CoordinatorHandle, CoordinatorSettings};
pub use dispatch::{
    AsyncDispatchSettings, BroadcastKind, DispatchJob, DispatchStrategy, Dispatcher,
    OverflowPolicy,
};
pub use messages::*;
pub use metrics::{
    CoordinatorMetrics, CoordinatorMetricsSnapshot, Pressure, QueueKind, QueueMonitor,
};
