use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use tracing::warn;

use triage_core::{EscalationGroup, GroupId};

use super::AppState;
use crate::error::ServerError;

/// `GET /escalations/active` — currently active responder groups.
pub async fn active(
    State(state): State<AppState>,
) -> Result<Json<Vec<EscalationGroup>>, ServerError> {
    Ok(Json(state.store.active_escalations().await?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub notes: String,
}

/// `POST /escalations/{group_id}/resolve` — close an escalation with notes.
///
/// The resolution is durable first; the closing chat message is
/// best-effort and a posting failure only logs.
pub async fn resolve(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<EscalationGroup>, ServerError> {
    let group_id = GroupId::new(group_id);
    let resolved = state
        .store
        .resolve_escalation(&group_id, &request.notes)
        .await?;

    let message = triage_pipeline::escalator::resolution_message(&request.notes);
    if let Err(e) = state.chat.post_message(&group_id, &message).await {
        warn!(group_id = %group_id, error = %e, "resolution message not posted");
    }

    Ok(Json(resolved))
}
