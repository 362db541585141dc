//! Health endpoints for the Room Controller.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (is the room manager accepting rooms?)
//!
//! The `/metrics` endpoint is merged in by the binary from the Prometheus
//! exporter handle.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness and readiness for one Room Controller instance.
#[derive(Debug)]
pub struct HealthState {
    rc_id: String,
    live: AtomicBool,
    /// Set once the room manager is running; cleared when draining starts.
    ready: AtomicBool,
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new(rc_id: impl Into<String>) -> Self {
        Self {
            rc_id: rc_id.into(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn rc_id(&self) -> &str {
        &self.rc_id
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Body of the readiness probe response.
#[derive(Debug, Serialize)]
pub struct ReadinessBody {
    pub status: &'static str,
    pub rc_id: String,
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Returns 200 with `{"status":"ready"}` when accepting rooms, 503 otherwise.
async fn readiness_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<ReadinessBody>) {
    let (code, status) = if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    let body = ReadinessBody {
        status,
        rc_id: state.rc_id().to_string(),
    };
    (code, Json(body))
}
