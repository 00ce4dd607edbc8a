//! Outbound client sinks.
//!
//! A `ClientSink` is the coordinator's only handle on a client's outbound
//! stream: a bounded queue drained by the connection's writer task, plus a
//! revocation token shared with that connection. When the peer stops
//! reading, the writer stalls on the socket, the queue fills and `send`
//! suspends. That is the backpressure the dispatch strategies are built
//! around.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Serialized outbound line (without the trailing newline).
pub type Payload = Arc<str>;

/// Outbound write failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The connection's writer is gone.
    #[error("sink closed")]
    Closed,

    /// The write did not complete before the per-write deadline.
    #[error("sink write timed out")]
    TimedOut,

    /// The session was revoked while the write was pending.
    #[error("sink revoked")]
    Revoked,

    /// The queue is full (non-blocking writes only).
    #[error("sink full")]
    Full,
}

impl SinkError {
    /// Returns the error as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SinkError::Closed => "closed",
            SinkError::TimedOut => "timed_out",
            SinkError::Revoked => "revoked",
            SinkError::Full => "full",
        }
    }
}

/// Handle to one client session's outbound queue.
#[derive(Debug, Clone)]
pub struct ClientSink {
    identity: Arc<str>,
    session_id: Uuid,
    sender: mpsc::Sender<Payload>,
    revoked: CancellationToken,
}

impl ClientSink {
    /// Create a sink and the receiving end its writer drains.
    ///
    /// `revoked` is the session token: cancelling it aborts pending writes
    /// and tells the owning connection to close.
    #[must_use]
    pub fn channel(
        identity: impl Into<Arc<str>>,
        capacity: usize,
        revoked: CancellationToken,
    ) -> (Self, mpsc::Receiver<Payload>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let sink = Self {
            identity: identity.into(),
            session_id: Uuid::new_v4(),
            sender,
            revoked,
        };
        (sink, receiver)
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Unique per registration; distinguishes reconnects under one identity.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queue a line, waiting for room.
    ///
    /// # Errors
    ///
    /// `Revoked` if the session is revoked first, `Closed` if the writer
    /// has gone away.
    pub async fn send(&self, line: Payload) -> Result<(), SinkError> {
        if self.revoked.is_cancelled() {
            return Err(SinkError::Revoked);
        }
        tokio::select! {
            () = self.revoked.cancelled() => Err(SinkError::Revoked),
            result = self.sender.send(line) => result.map_err(|_| SinkError::Closed),
        }
    }

    /// Queue a line, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// As [`ClientSink::send`], plus `TimedOut`.
    pub async fn send_timeout(&self, line: Payload, timeout: Duration) -> Result<(), SinkError> {
        tokio::time::timeout(timeout, self.send(line))
            .await
            .map_err(|_| SinkError::TimedOut)?
    }

    /// Queue a line only if there is room right now.
    ///
    /// # Errors
    ///
    /// `Full`, `Closed` or `Revoked`.
    pub fn try_send(&self, line: Payload) -> Result<(), SinkError> {
        if self.revoked.is_cancelled() {
            return Err(SinkError::Revoked);
        }
        self.sender.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    /// Revoke the session. Pending and future writes fail with `Revoked`.
    pub fn revoke(&self) {
        self.revoked.cancel();
    }

    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked.is_cancelled()
    }

    /// Revoked, or the writer has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.is_revoked() || self.sender.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn line(text: &str) -> Payload {
        Arc::from(text)
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (sink, mut rx) = ClientSink::channel("x1", 4, CancellationToken::new());

        sink.send(line("hello")).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(sink.identity(), "x1");
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let (a, _rx_a) = ClientSink::channel("x1", 1, CancellationToken::new());
        let (b, _rx_b) = ClientSink::channel("x1", 1, CancellationToken::new());
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.session_id(), a.clone().session_id());
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_is_closed() {
        let (sink, rx) = ClientSink::channel("x1", 1, CancellationToken::new());
        drop(rx);

        assert_eq!(sink.send(line("x")).await, Err(SinkError::Closed));
        assert!(sink.is_closed());
        assert!(!sink.is_revoked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_on_full_queue() {
        let (sink, _rx) = ClientSink::channel("x1", 1, CancellationToken::new());
        sink.send(line("fills")).await.unwrap();

        let result = sink
            .send_timeout(line("stalls"), Duration::from_millis(100))
            .await;
        assert_eq!(result, Err(SinkError::TimedOut));
    }

    #[tokio::test]
    async fn test_revoke_unblocks_pending_send() {
        let (sink, _rx) = ClientSink::channel("x1", 1, CancellationToken::new());
        sink.send(line("fills")).await.unwrap();

        let pending = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.send(line("stalls")).await })
        };
        tokio::task::yield_now().await;
        sink.revoke();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("revocation should unblock the send")
            .unwrap();
        assert_eq!(result, Err(SinkError::Revoked));
        assert_eq!(sink.try_send(line("late")), Err(SinkError::Revoked));
    }

    #[tokio::test]
    async fn test_try_send_reports_full() {
        let (sink, mut rx) = ClientSink::channel("x1", 1, CancellationToken::new());

        sink.try_send(line("a")).unwrap();
        assert_eq!(sink.try_send(line("b")), Err(SinkError::Full));
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        sink.try_send(line("c")).unwrap();
    }
}
