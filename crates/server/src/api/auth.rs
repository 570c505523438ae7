use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use triage_core::AuthenticationAttempt;
use triage_auth::validate_claims;

use super::AppState;
use crate::error::ServerError;

/// Require a valid bearer token on every non-health endpoint.
///
/// Claim inspection is delegated to the token broker's validation rules;
/// a missing header, malformed token, or failed check maps to 401. Every
/// attempt is recorded for the lockout and monitoring trail.
/// Authentication is skipped when no auth settings are configured.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(ref auth_config) = state.auth else {
        return Ok(next.run(request).await);
    };

    match check_bearer(&state, auth_config, request.headers()).await {
        Ok(()) => {
            record_attempt(&state, true, None).await;
            Ok(next.run(request).await)
        }
        Err(e) => {
            record_attempt(&state, false, Some(e.to_string())).await;
            Err(e)
        }
    }
}

async fn check_bearer(
    _state: &AppState,
    auth_config: &triage_auth::AuthConfig,
    headers: &axum::http::HeaderMap,
) -> Result<(), ServerError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("missing Authorization header".to_owned()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServerError::Unauthorized("expected a bearer token".to_owned()))?;

    let validation = validate_claims(token, auth_config)
        .map_err(|e| ServerError::Unauthorized(e.to_string()))?;

    if !validation.valid {
        let reason = validation
            .reason
            .unwrap_or_else(|| "validation failed".to_owned());
        return Err(ServerError::Unauthorized(format!(
            "token check failed: {reason}"
        )));
    }

    Ok(())
}

async fn record_attempt(state: &AppState, success: bool, reason: Option<String>) {
    let attempt = AuthenticationAttempt::new("http_api", success, reason);
    if let Err(e) = state.store.record_auth_attempt(&attempt).await {
        tracing::debug!(error = %e, "auth attempt not recorded");
    }
}
