use thiserror::Error;

use triage_core::TriageError;

/// Errors specific to the mail gateway.
///
/// These are internal errors that get converted into [`TriageError`] at the
/// public API boundary.
#[derive(Debug, Error)]
pub enum MailError {
    /// A network-level transport error occurred.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The platform rejected the access token.
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// The caller lacks permission for the mailbox or operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The platform returned a payload we cannot use.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The platform signalled rate limiting.
    #[error("rate limited by mail platform")]
    RateLimited,
}

impl MailError {
    /// Classify an HTTP error status from the platform.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => Self::AuthExpired(format!("HTTP 401: {body}")),
            403 => Self::PermissionDenied(format!("HTTP 403: {body}")),
            429 => Self::RateLimited,
            400 | 404 | 422 => Self::Malformed(format!("HTTP {status}: {body}")),
            _ => Self::Transient(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<MailError> for TriageError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Transient(msg) => TriageError::TransientNetwork(msg),
            MailError::AuthExpired(msg) => TriageError::AuthExpired(msg),
            MailError::PermissionDenied(msg) => TriageError::PermissionDenied(msg),
            MailError::Malformed(msg) => TriageError::Malformed(msg),
            MailError::RateLimited => TriageError::RateLimited("mail platform".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            MailError::from_status(reqwest::StatusCode::UNAUTHORIZED, ""),
            MailError::AuthExpired(_)
        ));
        assert!(matches!(
            MailError::from_status(reqwest::StatusCode::FORBIDDEN, ""),
            MailError::PermissionDenied(_)
        ));
        assert!(matches!(
            MailError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            MailError::RateLimited
        ));
        assert!(matches!(
            MailError::from_status(reqwest::StatusCode::BAD_REQUEST, ""),
            MailError::Malformed(_)
        ));
        assert!(matches!(
            MailError::from_status(reqwest::StatusCode::BAD_GATEWAY, ""),
            MailError::Transient(_)
        ));
    }

    #[test]
    fn transient_converts_retryable() {
        let err: TriageError = MailError::Transient("reset".into()).into();
        assert!(err.is_retryable());

        let err: TriageError = MailError::PermissionDenied("no".into()).into();
        assert!(!err.is_retryable());
    }
}
