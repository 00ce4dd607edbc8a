//! Coordinator and server builders.

use crate::test_sink::TestSink;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vote_coordinator::actors::{
    AsyncDispatchSettings, CoordinatorHandle, CoordinatorMetrics, CoordinatorSettings,
    DispatchStrategy, OverflowPolicy,
};
use vote_coordinator::connection::ConnectionSettings;
use vote_coordinator::server::VoteServer;

/// The standard `{A, B, C}` option set.
pub fn abc_options() -> Vec<String> {
    vec!["A".to_string(), "B".to_string(), "C".to_string()]
}

/// Strategy A.
pub fn locked() -> DispatchStrategy {
    DispatchStrategy::LockedSync
}

/// Strategy B with default settings.
pub fn decoupled() -> DispatchStrategy {
    DispatchStrategy::decoupled()
}

/// Strategy B with explicit queue settings.
pub fn decoupled_with(
    queue_capacity: usize,
    workers: usize,
    overflow: OverflowPolicy,
    write_timeout: Option<Duration>,
) -> DispatchStrategy {
    DispatchStrategy::DecoupledAsync(AsyncDispatchSettings {
        queue_capacity,
        workers,
        overflow,
        write_timeout,
    })
}

/// Spawn a coordinator over `{A, B, C}`.
pub fn spawn_coordinator(strategy: DispatchStrategy) -> CoordinatorHandle {
    CoordinatorHandle::spawn(
        CoordinatorSettings::new(abc_options(), strategy),
        CoordinatorMetrics::new(),
    )
    .expect("Failed to spawn coordinator")
}

/// Register a fresh [`TestSink`] under `identity`.
pub async fn register(coordinator: &CoordinatorHandle, identity: &str) -> TestSink {
    let sink = TestSink::new(identity);
    coordinator
        .register(sink.sink())
        .await
        .expect("Registration should succeed");
    sink
}

/// A vote server on an ephemeral localhost port.
pub struct TestVoteServer {
    pub addr: SocketAddr,
    pub coordinator: CoordinatorHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TestVoteServer {
    pub async fn spawn(strategy: DispatchStrategy) -> Self {
        Self::spawn_with(spawn_coordinator(strategy), ConnectionSettings::default()).await
    }

    pub async fn spawn_with(coordinator: CoordinatorHandle, settings: ConnectionSettings) -> Self {
        let server = VoteServer::bind("127.0.0.1:0", coordinator.clone(), settings)
            .await
            .expect("Failed to bind test vote server");
        let addr = server.local_addr().expect("Bound server has an address");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.run(cancel.clone()));

        Self {
            addr,
            coordinator,
            cancel,
            task,
        }
    }

    /// Stop accepting and close every connection.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}
