//! Probe and scrape endpoints, served on their own listener.
//!
//! | Path       | 200 when                                         |
//! |------------|--------------------------------------------------|
//! | `/health`  | the coordinator actor is still running           |
//! | `/ready`   | the actor is running and the listener is accepting |
//! | `/metrics` | always (Prometheus text), if a handle is mounted |

use axum::{extract::State, http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Probe state shared between `main` and the HTTP handlers.
///
/// Liveness is derived from a child of the coordinator token, so a
/// coordinator that stops on its own turns both probes red without
/// anyone flipping a flag.
#[derive(Debug)]
pub struct HealthState {
    coordinator: CancellationToken,
    accepting: AtomicBool,
}

impl HealthState {
    /// `coordinator` should be a child of the coordinator's token.
    #[must_use]
    pub fn new(coordinator: CancellationToken) -> Self {
        Self {
            coordinator,
            accepting: AtomicBool::new(false),
        }
    }

    /// The vote listener is bound and taking clients.
    pub fn mark_accepting(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Shutdown has begun; stop routing new clients here.
    pub fn mark_draining(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.coordinator.is_cancelled()
    }

    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.is_alive() && self.accepting.load(Ordering::SeqCst)
    }
}

/// `/health` and `/ready` only.
pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .with_state(state)
}

/// Probes plus `/metrics` rendered from `prometheus`.
pub fn observability_router(state: Arc<HealthState>, prometheus: PrometheusHandle) -> Router {
    health_router(state).route(
        "/metrics",
        get(move || {
            let handle = prometheus.clone();
            async move { handle.render() }
        }),
    )
}

fn probe(ok: bool, down: &'static str) -> (StatusCode, &'static str) {
    if ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, down)
    }
}

async fn liveness(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    probe(state.is_alive(), "coordinator stopped")
}

async fn readiness(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    if !state.is_alive() {
        return probe(false, "coordinator stopped");
    }
    probe(state.is_accepting(), "not accepting clients")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;

    async fn probe_path(app: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_not_accepting_until_marked() {
        let token = CancellationToken::new();
        let state = HealthState::new(token.child_token());
        assert!(state.is_alive());
        assert!(!state.is_accepting());

        state.mark_accepting();
        assert!(state.is_accepting());

        state.mark_draining();
        assert!(!state.is_accepting());
    }

    #[test]
    fn test_coordinator_stop_overrides_accepting() {
        let token = CancellationToken::new();
        let state = HealthState::new(token.child_token());
        state.mark_accepting();

        token.cancel();
        assert!(!state.is_alive());
        assert!(!state.is_accepting());
    }

    #[tokio::test]
    async fn test_readiness_reports_reason() {
        let token = CancellationToken::new();
        let state = Arc::new(HealthState::new(token.child_token()));
        let app = health_router(Arc::clone(&state));

        assert_eq!(
            probe_path(app.clone(), "/ready").await,
            (StatusCode::SERVICE_UNAVAILABLE, "not accepting clients".to_string())
        );

        state.mark_accepting();
        assert_eq!(
            probe_path(app.clone(), "/ready").await,
            (StatusCode::OK, "ok".to_string())
        );

        token.cancel();
        assert_eq!(
            probe_path(app.clone(), "/ready").await,
            (StatusCode::SERVICE_UNAVAILABLE, "coordinator stopped".to_string())
        );
        assert_eq!(
            probe_path(app, "/health").await.0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_metrics_mounted_next_to_probes() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let state = Arc::new(HealthState::new(CancellationToken::new()));
        let app = observability_router(state, recorder.handle());

        assert_eq!(probe_path(app.clone(), "/metrics").await.0, StatusCode::OK);
        assert_eq!(probe_path(app.clone(), "/health").await.0, StatusCode::OK);
        assert_eq!(probe_path(app, "/nope").await.0, StatusCode::NOT_FOUND);
    }
}
