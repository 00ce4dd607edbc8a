//! TCP voting listener.
//!
//! Accepts connections and runs one [`handle_connection`] task per client.
//! Connection tasks get child tokens of the server token, so cancelling the
//! server closes every client session.

use crate::actors::coordinator::CoordinatorHandle;
use crate::connection::{handle_connection, ConnectionSettings};
use crate::errors::VcError;

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Back-off after a failed `accept`.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long `run` waits for connection tasks after cancellation.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound TCP listener plus what each connection needs.
pub struct VoteServer {
    listener: TcpListener,
    coordinator: CoordinatorHandle,
    settings: ConnectionSettings,
}

impl VoteServer {
    /// Bind the listener. Binding happens here so the caller can fail fast
    /// and report readiness only once the port is held.
    ///
    /// # Errors
    ///
    /// `VcError::Config` if the address cannot be bound.
    pub async fn bind(
        addr: &str,
        coordinator: CoordinatorHandle,
        settings: ConnectionSettings,
    ) -> Result<Self, VcError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(target: "vc.server", error = %e, addr = %addr, "Failed to bind vote listener");
            VcError::Config(format!("Failed to bind vote listener to {addr}: {e}"))
        })?;

        Ok(Self {
            listener,
            coordinator,
            settings,
        })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// `VcError::Internal` if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, VcError> {
        self.listener
            .local_addr()
            .map_err(|e| VcError::Internal(format!("local_addr failed: {e}")))
    }

    /// Accept connections until `cancel` fires, then wait briefly for
    /// connection tasks to finish.
    pub async fn run(self, cancel: CancellationToken) {
        let tracker = TaskTracker::new();
        info!(
            target: "vc.server",
            addr = ?self.listener.local_addr().ok(),
            "Vote listener accepting connections"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(target: "vc.server", "Vote listener shutting down");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(
                                target: "vc.server",
                                error = %e,
                                peer = %peer,
                                "set_nodelay failed"
                            );
                        }
                        tracker.spawn(handle_connection(
                            stream,
                            peer,
                            self.coordinator.clone(),
                            self.settings,
                            cancel.child_token(),
                        ));
                    }
                    Err(e) => {
                        warn!(target: "vc.server", error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }

        tracker.close();
        if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                target: "vc.server",
                remaining = tracker.len(),
                "Connection tasks still running after drain timeout"
            );
        }
        info!(target: "vc.server", "Vote listener stopped");
    }
}
