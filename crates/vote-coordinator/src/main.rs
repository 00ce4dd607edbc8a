//! Vote Coordinator
//!
//! Real-time voting server over a line-oriented TCP protocol.
//!
//! # Listeners
//!
//! - Vote protocol over TCP (default 0.0.0.0:9000)
//! - Probes and Prometheus scrape over HTTP (default 0.0.0.0:8082)
//!
//! # Lifecycle
//!
//! 1. Read `VC_*` environment variables
//! 2. Install the Prometheus recorder
//! 3. Spawn the coordinator actor with the configured broadcast strategy
//! 4. Serve probes, then bind the vote listener and report ready
//! 5. Open the round after the configured delay
//! 6. On SIGTERM or Ctrl+C: report not ready, close client sessions,
//!    drain queued broadcasts, stop the coordinator

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vote_coordinator::actors::{CoordinatorHandle, CoordinatorMetrics};
use vote_coordinator::config::Config;
use vote_coordinator::connection::ConnectionSettings;
use vote_coordinator::observability::{init_metrics_recorder, observability_router, HealthState};
use vote_coordinator::server::VoteServer;

/// Time given to the vote listener to close client sessions.
const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Time given to remaining tasks after the coordinator stops.
const TASK_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vote_coordinator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    info!(
        vote_addr = %config.bind_address,
        probe_addr = %config.health_bind_address,
        options = ?config.options,
        strategy = config.dispatch_strategy.as_str(),
        outbound_buffer = config.outbound_buffer,
        round_secs = config.round_duration.as_secs(),
        start_delay_secs = ?config.round_start_delay.map(|d| d.as_secs()),
        padding = config.update_padding_bytes,
        "Vote Coordinator starting"
    );

    // Before anything records a metric
    let prometheus = init_metrics_recorder()
        .inspect_err(|e| error!(error = %e, "Prometheus recorder unavailable"))?;

    let coordinator =
        CoordinatorHandle::spawn(config.coordinator_settings(), CoordinatorMetrics::new())
            .inspect_err(|e| error!(error = %e, "Coordinator failed to start"))?;

    // Child of the coordinator token: a coordinator that dies takes the
    // listeners down with it.
    let shutdown = coordinator.child_token();
    let health = Arc::new(HealthState::new(coordinator.child_token()));

    serve_probes(
        &config.health_bind_address,
        observability_router(Arc::clone(&health), prometheus),
        shutdown.child_token(),
    )
    .await?;

    let server = VoteServer::bind(
        &config.bind_address,
        coordinator.clone(),
        ConnectionSettings {
            outbound_buffer: config.outbound_buffer,
        },
    )
    .await?;
    info!(addr = %server.local_addr()?, "Vote listener bound");
    let server_task = tokio::spawn(server.run(shutdown.child_token()));
    health.mark_accepting();

    if let Some(delay) = config.round_start_delay {
        schedule_round_start(
            coordinator.clone(),
            delay,
            config.round_duration,
            shutdown.child_token(),
        );
    }

    wait_for_stop_signal().await;
    info!("Stop requested, draining");

    health.mark_draining();
    shutdown.cancel();

    if tokio::time::timeout(LISTENER_STOP_TIMEOUT, server_task)
        .await
        .is_err()
    {
        warn!("Vote listener did not stop in time");
    }

    if let Err(e) = coordinator.shutdown(config.shutdown_drain).await {
        warn!(error = %e, "Coordinator shutdown error");
    }
    tokio::time::sleep(TASK_SHUTDOWN_GRACE).await;

    info!("Vote Coordinator stopped");
    Ok(())
}

/// Bind the probe listener now, serve it in the background until `stop`.
async fn serve_probes(addr: &str, app: Router, stop: CancellationToken) -> Result<(), String> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr, "Probe listener bind failed");
        format!("cannot bind probe listener on {addr}: {e}")
    })?;
    info!(addr, "Probe listener bound");

    tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await;
        match served {
            Ok(()) => info!("Probe listener stopped"),
            Err(e) => error!(error = %e, "Probe listener failed"),
        }
    });
    Ok(())
}

/// Open the round after `delay`, unless shutdown comes first.
fn schedule_round_start(
    coordinator: CoordinatorHandle,
    delay: Duration,
    duration: Duration,
    cancel: CancellationToken,
) {
    info!(
        delay_secs = delay.as_secs(),
        duration_secs = duration.as_secs(),
        "Round scheduled"
    );
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => {
                if let Err(e) = coordinator.start_round(duration).await {
                    warn!(error = %e, "Scheduled round start failed");
                }
            }
        }
    });
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
#[expect(
    clippy::expect_used,
    reason = "Signal handler installation failure is unrecoverable"
)]
async fn wait_for_stop_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.expect("Ctrl+C handler"),
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.expect("Ctrl+C handler");
}
