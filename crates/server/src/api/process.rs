use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::info;

use super::AppState;
use crate::error::ServerError;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    status: &'static str,
}

/// `POST /process/trigger` — enqueue a cycle and return immediately.
///
/// The spawned cycle obeys the scheduler's single-flight guard; when one is
/// already running the trigger is dropped there and logged.
pub async fn trigger(State(state): State<AppState>) -> impl IntoResponse {
    let scheduler = Arc::clone(&state.scheduler);
    tokio::spawn(async move {
        if scheduler.trigger_immediate().await.is_none() {
            info!("triggered cycle dropped, another is in progress");
        }
    });

    (StatusCode::ACCEPTED, Json(TriggerResponse { status: "queued" }))
}

/// `POST /process/immediate` — run a cycle synchronously and return its
/// summary. 409 when a cycle is already in flight.
pub async fn immediate(
    State(state): State<AppState>,
) -> Result<Json<triage_pipeline::CycleSummary>, ServerError> {
    match state.scheduler.trigger_immediate().await {
        Some(summary) => Ok(Json(summary)),
        None => Err(ServerError::CycleInProgress),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    scheduler: triage_pipeline::SchedulerStatus,
    processing_7d: triage_store::ProcessingStatistics,
}

/// `GET /process/status` — scheduler counters plus recent statistics.
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ServerError> {
    let processing_7d = state.store.processing_statistics(7).await?;
    Ok(Json(StatusResponse {
        scheduler: state.scheduler.status(),
        processing_7d,
    }))
}
