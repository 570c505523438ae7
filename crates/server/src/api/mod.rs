pub mod analytics;
pub mod auth;
pub mod escalations;
pub mod health;
pub mod process;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use triage_auth::AuthConfig;
use triage_chat::ChatGateway;
use triage_pipeline::Scheduler;
use triage_store::TriageStore;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The scheduler driving the pipeline.
    pub scheduler: Arc<Scheduler>,
    /// The durable store.
    pub store: Arc<dyn TriageStore>,
    /// Chat gateway for resolution messages.
    pub chat: Arc<dyn ChatGateway>,
    /// Bearer-token validation settings. `None` disables authentication
    /// (tests, local development).
    pub auth: Option<Arc<AuthConfig>>,
}

/// Build the Axum router with all API routes and middleware.
pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/health", get(health::health));

    let protected = Router::new()
        .route("/process/trigger", post(process::trigger))
        .route("/process/immediate", post(process::immediate))
        .route("/process/status", get(process::status))
        .route("/analytics/dashboard", get(analytics::dashboard))
        .route("/analytics/feedback", post(analytics::feedback))
        .route("/escalations/active", get(escalations::active))
        .route(
            "/escalations/{group_id}/resolve",
            post(escalations::resolve),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
