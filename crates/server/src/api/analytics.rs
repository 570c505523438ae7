use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use triage_core::{EmailId, HumanFeedback};
use triage_store::DashboardSnapshot;

use super::AppState;
use crate::error::ServerError;

/// `GET /analytics/dashboard` — rolled-up counts.
pub async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardSnapshot>, ServerError> {
    Ok(Json(state.store.dashboard_snapshot().await?))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub email_id: String,
    pub feedback: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    status: &'static str,
}

/// `POST /analytics/feedback` — attach reviewer feedback to a stored
/// classification. 400 on an unknown feedback value, 404 when the email has
/// no classification.
pub async fn feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ServerError> {
    let feedback = HumanFeedback::parse(&request.feedback).ok_or_else(|| {
        ServerError::BadRequest(format!(
            "feedback must be one of correct/incorrect/partial, got {:?}",
            request.feedback
        ))
    })?;

    state
        .store
        .add_human_feedback(
            &EmailId::new(request.email_id),
            feedback,
            request.notes.as_deref(),
        )
        .await?;

    Ok(Json(FeedbackResponse { status: "recorded" }))
}
