//! Message types for the coordinator actor.
//!
//! Request/response messages carry a `respond_to` oneshot sender.

use crate::errors::VcError;
use crate::sink::ClientSink;
use crate::voting::{RoundPhase, TallySnapshot, Transition};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Messages handled by `CoordinatorActor`.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// Register a client session; replies with the current round status.
    Register {
        sink: ClientSink,
        respond_to: oneshot::Sender<Result<RoundStatus, VcError>>,
    },

    /// Remove a client session. With `session_id`, only that exact session
    /// is removed. Replies `true` if something was removed.
    Unregister {
        client_id: String,
        session_id: Option<Uuid>,
        respond_to: oneshot::Sender<bool>,
    },

    /// Cast a vote on behalf of `client_id`.
    SubmitVote {
        client_id: String,
        option: String,
        respond_to: oneshot::Sender<Result<VoteReceipt, VcError>>,
    },

    /// `NotStarted -> Active` with the given duration.
    StartRound {
        duration: Duration,
        respond_to: oneshot::Sender<Result<Transition, VcError>>,
    },

    /// `Active -> Ended`.
    EndRound {
        respond_to: oneshot::Sender<Transition>,
    },

    /// Deferred round end, sent by the deadline timer or a late vote.
    RoundDeadline,

    /// Current round status.
    GetStatus {
        respond_to: oneshot::Sender<RoundStatus>,
    },

    /// Drain the dispatcher and stop.
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), VcError>>,
    },
}

/// Point-in-time view of the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundStatus {
    pub phase: RoundPhase,
    /// Time left before the deadline; `None` unless `Active`.
    pub remaining: Option<Duration>,
    pub options: Vec<String>,
    pub tally: TallySnapshot,
    /// Registered client sessions.
    pub registered: usize,
    /// Identities with a recorded vote.
    pub voted: usize,
}

/// What happened to the broadcast caused by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    /// Delivered inside the coordinator (locked strategy).
    Inline,
    /// Handed to the dispatch queue.
    Queued,
    /// Discarded by the drop overflow policy, or the dispatcher is stopped.
    Dropped,
}

/// Result of an accepted vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub option: String,
    /// Tally right after this vote.
    pub tally: TallySnapshot,
    pub broadcast: BroadcastStatus,
    /// Whether the `OK:` line was already queued on the voter's sink ahead of
    /// the update. When `false`, the caller is responsible for sending it.
    pub acknowledged: bool,
}
