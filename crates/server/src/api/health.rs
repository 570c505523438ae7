use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    healthy: bool,
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    scheduler: triage_pipeline::SchedulerHealth,
    store: ComponentStatus,
}

/// `GET /health` — liveness plus per-component status.
///
/// 200 with `"healthy"` or `"degraded"` (store unreachable but the
/// scheduler alive); 500 with `"unhealthy"` when the scheduler itself is
/// sick.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let scheduler = state.scheduler.health();

    let store = match state.store.dashboard_snapshot().await {
        Ok(_) => ComponentStatus {
            healthy: true,
            detail: None,
        },
        Err(e) => ComponentStatus {
            healthy: false,
            detail: Some(e.to_string()),
        },
    };

    let (code, status) = if !scheduler.healthy {
        (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy")
    } else if !store.healthy {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::OK, "healthy")
    };

    (
        code,
        Json(HealthResponse {
            status,
            scheduler,
            store,
        }),
    )
}
