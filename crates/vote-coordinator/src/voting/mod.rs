//! Vote state owned by the coordinator actor.
//!
//! - [`round`] - `VotingRound` phase machine and deadline
//! - [`ledger`] - `VoteLedger` (one vote per identity) and `TallySnapshot`
//! - [`registry`] - `ClientRegistry` of live outbound sinks
//!
//! None of these types synchronize internally; they are only touched from
//! inside the coordinator actor.

pub mod ledger;
pub mod registry;
pub mod round;

pub use ledger::{TallySnapshot, VoteLedger};
pub use registry::ClientRegistry;
pub use round::{RoundPhase, Transition, VotingRound, MAX_ROUND_DURATION};
