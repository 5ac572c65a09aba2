//! Health endpoint for the gateway.
//!
//! Create with [`create_router`]. The handler asks the event loop for a [`HealthReport`], so
//! a stalled loop shows up as 503 instead of a stale answer.

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use log::warn;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::engine::HealthReport;
use crate::scheduler::{EngineEvent, LoopHandle};

const LOOP_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared app state: the handle into the event loop.
#[derive(Clone)]
pub struct AppState {
    pub(crate) handle: LoopHandle,
}

/// Builds the router. Returns `Router<()>` so callers can `.into_make_service()` for `axum::serve`.
pub fn create_router(handle: LoopHandle) -> Router<()> {
    Router::new()
        .route("/health", get(health))
        .layer(Extension(AppState { handle }))
}

#[derive(serde::Serialize)]
struct Unavailable {
    healthy: bool,
    error: &'static str,
}

async fn health(Extension(state): Extension<AppState>) -> axum::response::Response {
    let (tx, rx) = oneshot::channel();
    if !state.handle.schedule(EngineEvent::Health(tx)) {
        return unavailable("event loop stopped");
    }
    match tokio::time::timeout(LOOP_REPLY_TIMEOUT, rx).await {
        Ok(Ok(report)) => report_response(report),
        Ok(Err(_)) => unavailable("event loop dropped the request"),
        Err(_) => {
            warn!("health check timed out waiting for the event loop");
            unavailable("event loop did not answer")
        }
    }
}

fn report_response(report: HealthReport) -> axum::response::Response {
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

fn unavailable(error: &'static str) -> axum::response::Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(Unavailable { healthy: false, error }),
    )
        .into_response()
}
