//! In-memory client sinks.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use vote_coordinator::sink::{ClientSink, Payload};

/// How long `recv_line` waits before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Default queue size: large enough that tests never block on it.
pub const DEFAULT_TEST_SINK_CAPACITY: usize = 1024;

/// A `ClientSink` whose outbound queue is read by the test instead of a
/// socket writer.
pub struct TestSink {
    sink: ClientSink,
    receiver: mpsc::Receiver<Payload>,
}

impl TestSink {
    pub fn new(identity: &str) -> Self {
        Self::with_capacity(identity, DEFAULT_TEST_SINK_CAPACITY)
    }

    /// A sink with a small queue. Left unread, it models a client that
    /// stopped reading from its socket.
    pub fn with_capacity(identity: &str, capacity: usize) -> Self {
        let (sink, receiver) = ClientSink::channel(identity, capacity, CancellationToken::new());
        Self { sink, receiver }
    }

    /// Handle to register with the coordinator.
    pub fn sink(&self) -> ClientSink {
        self.sink.clone()
    }

    pub fn identity(&self) -> &str {
        self.sink.identity()
    }

    pub fn is_revoked(&self) -> bool {
        self.sink.is_revoked()
    }

    /// Next line, or `None` if nothing arrives within [`RECV_TIMEOUT`].
    pub async fn recv_line(&mut self) -> Option<String> {
        match tokio::time::timeout(RECV_TIMEOUT, self.receiver.recv()).await {
            Ok(Some(line)) => Some(line.to_string()),
            Ok(None) | Err(_) => None,
        }
    }

    /// Assert the next line equals `expected`.
    pub async fn expect_line(&mut self, expected: &str) {
        let line = self.recv_line().await;
        assert_eq!(
            line.as_deref(),
            Some(expected),
            "{}: unexpected line",
            self.identity()
        );
    }

    /// Assert the next line starts with `prefix` and return it.
    pub async fn expect_prefix(&mut self, prefix: &str) -> String {
        let line = self
            .recv_line()
            .await
            .unwrap_or_else(|| {
                panic!("{}: expected a line starting with {prefix:?}", self.identity())
            });
        assert!(
            line.starts_with(prefix),
            "{}: expected prefix {prefix:?}, got {line:?}",
            self.identity()
        );
        line
    }

    /// Assert nothing is queued right now.
    pub fn assert_silent(&mut self) {
        match self.receiver.try_recv() {
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            Ok(line) => panic!("{}: expected no lines, got {line:?}", self.identity()),
        }
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.receiver.try_recv() {
            lines.push(line.to_string());
        }
        lines
    }
}
