//! Voting round state machine.
//!
//! Phases only move forward: `NotStarted -> Active -> Ended`. A round that
//! is `Active` past its deadline still reports `Active` until something
//! (the deadline task, a late vote, or an explicit end) drives the
//! `Ended` transition through the coordinator.

use crate::errors::VcError;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Longest round `start` accepts.
pub const MAX_ROUND_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Round phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundPhase {
    /// Waiting for an explicit start.
    NotStarted,
    /// Accepting votes until the deadline.
    Active,
    /// Closed; final tally published.
    Ended,
}

impl RoundPhase {
    /// Returns the phase as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::NotStarted => "not_started",
            RoundPhase::Active => "active",
            RoundPhase::Ended => "ended",
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a start/end request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The phase changed.
    Applied,
    /// The request was a no-op; carries the phase that was observed.
    Ignored(RoundPhase),
}

impl Transition {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Round phase plus deadline.
#[derive(Debug, Clone)]
pub struct VotingRound {
    phase: RoundPhase,
    duration: Option<Duration>,
    deadline: Option<Instant>,
}

impl Default for VotingRound {
    fn default() -> Self {
        Self::new()
    }
}

impl VotingRound {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RoundPhase::NotStarted,
            duration: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Configured length of the round, once started.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// `NotStarted -> Active`, with the deadline at `now + duration`.
    ///
    /// # Errors
    ///
    /// `InvalidRoundDuration` when `duration` exceeds [`MAX_ROUND_DURATION`]
    /// or the deadline is not representable. The phase is left unchanged.
    pub fn start(&mut self, duration: Duration, now: Instant) -> Result<Transition, VcError> {
        if self.phase != RoundPhase::NotStarted {
            return Ok(Transition::Ignored(self.phase));
        }
        let deadline = Some(duration)
            .filter(|d| *d <= MAX_ROUND_DURATION)
            .and_then(|d| now.checked_add(d))
            .ok_or(VcError::InvalidRoundDuration(duration.as_secs()))?;

        self.phase = RoundPhase::Active;
        self.duration = Some(duration);
        self.deadline = Some(deadline);
        Ok(Transition::Applied)
    }

    /// `Active -> Ended`.
    pub fn end(&mut self) -> Transition {
        if self.phase != RoundPhase::Active {
            return Transition::Ignored(self.phase);
        }
        self.phase = RoundPhase::Ended;
        Transition::Applied
    }

    /// Whether an `Active` round has reached its deadline at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.phase == RoundPhase::Active && self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Gate for vote acceptance.
    ///
    /// # Errors
    ///
    /// `RoundNotActive` outside the `Active` phase, `RoundExpired` once the
    /// deadline has passed.
    pub fn ensure_accepting(&self, now: Instant) -> Result<(), VcError> {
        match self.phase {
            RoundPhase::Active if self.is_expired(now) => Err(VcError::RoundExpired),
            RoundPhase::Active => Ok(()),
            phase => Err(VcError::RoundNotActive(phase)),
        }
    }

    /// Time left before the deadline; `None` unless `Active`.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.phase != RoundPhase::Active {
            return None;
        }
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}
