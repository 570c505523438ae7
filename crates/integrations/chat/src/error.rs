use thiserror::Error;

use triage_core::TriageError;

/// Errors specific to the chat gateway.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A network-level transport error occurred.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The platform rejected the access token.
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// The caller lacks permission for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The platform returned a payload we cannot use.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The platform signalled rate limiting.
    #[error("rate limited by chat platform")]
    RateLimited,

    /// The group exists but messaging is not yet provisioned.
    #[error("group {0} created but messaging is not ready")]
    PartialProvisioning(String),

    /// No member address resolved to a directory identity.
    #[error("no group members could be resolved")]
    NoMembersResolved,
}

impl ChatError {
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

impl From<ChatError> for TriageError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Transient(msg) => TriageError::TransientNetwork(msg),
            ChatError::AuthExpired(msg) => TriageError::AuthExpired(msg),
            ChatError::PermissionDenied(msg) => TriageError::PermissionDenied(msg),
            ChatError::Malformed(msg) | ChatError::PartialProvisioning(msg) => {
                TriageError::Malformed(msg)
            }
            ChatError::RateLimited => TriageError::RateLimited("chat platform".to_owned()),
            ChatError::NoMembersResolved => {
                TriageError::Malformed("no group members could be resolved".to_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            ChatError::from_status(reqwest::StatusCode::UNAUTHORIZED, ""),
            ChatError::AuthExpired(_)
        ));
        assert!(matches!(
            ChatError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, ""),
            ChatError::Transient(_)
        ));
    }

    #[test]
    fn partial_provisioning_is_not_retryable_as_triage_error() {
        let err: TriageError = ChatError::PartialProvisioning("g-1".into()).into();
        assert!(!err.is_retryable());
    }
}
