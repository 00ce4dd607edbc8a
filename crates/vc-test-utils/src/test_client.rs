//! Line-oriented TCP client for end-to-end tests.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

/// How long `recv_line` waits before giving up.
pub const CLIENT_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A client speaking the voting line protocol.
pub struct TestClient {
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("Failed to connect to vote server");
        let (read_half, write_half) = stream.into_split();
        Self {
            lines: FramedRead::new(read_half, LinesCodec::new()),
            writer: FramedWrite::new(write_half, LinesCodec::new()),
        }
    }

    /// Connect and send `identity` as the first line.
    pub async fn join(addr: SocketAddr, identity: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send_line(identity).await;
        client
    }

    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .send(line)
            .await
            .expect("Failed to write line");
    }

    pub async fn vote(&mut self, option: &str) {
        self.send_line(&format!("VOTE {option}")).await;
    }

    /// Next line, or `None` on timeout or EOF.
    pub async fn recv_line(&mut self) -> Option<String> {
        match tokio::time::timeout(CLIENT_RECV_TIMEOUT, self.lines.next()).await {
            Ok(Some(Ok(line))) => Some(line),
            _ => None,
        }
    }

    pub async fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.recv_line().await.as_deref(), Some(expected));
    }

    /// Assert the next line starts with `prefix` and return it.
    pub async fn expect_prefix(&mut self, prefix: &str) -> String {
        let line = self
            .recv_line()
            .await
            .unwrap_or_else(|| panic!("expected a line starting with {prefix:?}"));
        assert!(
            line.starts_with(prefix),
            "expected prefix {prefix:?}, got {line:?}"
        );
        line
    }

    /// Skip lines until one starts with `prefix`.
    pub async fn wait_for_prefix(&mut self, prefix: &str) -> String {
        loop {
            match self.recv_line().await {
                Some(line) if line.starts_with(prefix) => return line,
                Some(_) => continue,
                None => panic!("connection ended before a line starting with {prefix:?}"),
            }
        }
    }

    /// Assert the server closes the connection.
    pub async fn expect_closed(&mut self) {
        let next = tokio::time::timeout(CLIENT_RECV_TIMEOUT, self.lines.next())
            .await
            .expect("Connection was not closed in time");
        assert!(
            !matches!(next, Some(Ok(_))),
            "expected connection close, got {next:?}"
        );
    }
}
