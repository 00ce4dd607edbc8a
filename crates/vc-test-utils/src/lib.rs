//! # Vote Coordinator Test Utilities
//!
//! Shared test utilities for the vote coordinator.
//!
//! ## Modules
//!
//! - `test_sink` - In-memory client sinks with line assertions, including
//!   stalled sinks that never drain
//! - `test_client` - Line-oriented TCP client for end-to-end tests
//! - `fixtures` - Coordinator and server builders, standard option sets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let coordinator = spawn_coordinator(locked());
//!     let mut alice = register(&coordinator, "alice").await;
//!
//!     coordinator.start_round(Duration::from_secs(60)).await.unwrap();
//!     alice.expect_prefix("VOTACAO_INICIADA").await;
//! }
//! ```
//!
//! ## Test Patterns
//!
//! ### Slow consumers
//!
//! ```rust,ignore
//! // Capacity 1 and never read: the second write blocks.
//! let slow = TestSink::with_capacity("slow", 1);
//! coordinator.register(slow.sink()).await.unwrap();
//! ```

pub mod fixtures;
pub mod test_client;
pub mod test_sink;

// Re-export commonly used items
pub use fixtures::*;
pub use test_client::*;
pub use test_sink::*;
