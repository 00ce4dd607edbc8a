//! Vote Coordinator Library
//!
//! Real-time voting coordinator: clients connect over TCP, identify
//! themselves with a single line, cast at most one `VOTE` per round, and
//! receive live tally updates while the round is open.
//!
//! # Architecture
//!
//! ```text
//! VoteServer (TCP accept loop)
//! └── connection task (one per client)
//!     ├── reader: identity, VOTE commands -> CoordinatorHandle
//!     └── writer: ClientSink queue -> socket
//!
//! CoordinatorActor (singleton)
//! ├── ClientRegistry   identity -> ClientSink
//! ├── VoteLedger       votes + tally
//! ├── VotingRound      NotStarted -> Active -> Ended
//! └── Dispatcher       locked (inline) or decoupled (queue + workers)
//! ```
//!
//! # Key Design Decisions
//!
//! - **One owner for vote state**: every mutation is a coordinator message
//! - **Immutable snapshots**: broadcasts carry a `TallySnapshot`, never a reference
//! - **Swappable broadcast strategy**: fixed at construction, same semantics
//!   for everything except blocking behavior
//!
//! # Modules
//!
//! - [`actors`] - Coordinator actor, dispatch strategies, actor metrics
//! - [`config`] - Service configuration from environment
//! - [`connection`] - Per-client TCP session
//! - [`errors`] - Error taxonomy and client-facing reasons
//! - [`observability`] - Prometheus metrics and health endpoints
//! - [`protocol`] - Line protocol parsing and rendering
//! - [`server`] - TCP accept loop
//! - [`sink`] - Outbound client queues
//! - [`voting`] - Round, ledger and registry state

pub mod actors;
pub mod config;
pub mod connection;
pub mod errors;
pub mod observability;
pub mod protocol;
pub mod server;
pub mod sink;
pub mod voting;
