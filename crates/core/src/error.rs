use thiserror::Error;

/// Shared error taxonomy for the pipeline and its gateways.
///
/// Crate-local error types (mail, chat, LLM, store) convert into this
/// taxonomy at their public boundary so the orchestrator can make retry
/// decisions without knowing which service produced the failure.
#[derive(Debug, Error)]
pub enum TriageError {
    /// A network-level failure that may succeed on retry.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The remote service rejected the request due to rate limiting.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The access token is no longer valid.
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// The caller lacks permission for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The platform returned a payload we cannot use.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// LLM output could not be turned into a usable structure.
    #[error("unparseable model output: {0}")]
    ParseError(String),

    /// An operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration is invalid. Raised at load, never at first use.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A uniqueness constraint was violated (e.g. duplicate insert).
    #[error("integrity conflict: {0}")]
    IntegrityConflict(String),

    /// A programmer error. Not recoverable.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl TriageError {
    /// Whether the orchestrator should re-attempt the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::RateLimited(_) | Self::Timeout(_)
        )
    }

    /// Short kind tag used in audit records and persisted error stages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) => "transient_network",
            Self::RateLimited(_) => "rate_limited",
            Self::AuthExpired(_) => "auth_expired",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Malformed(_) => "malformed",
            Self::ParseError(_) => "parse_error",
            Self::Timeout(_) => "timeout",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::IntegrityConflict(_) => "integrity_conflict",
            Self::Fatal(_) => "fatal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(TriageError::TransientNetwork("reset".into()).is_retryable());
        assert!(TriageError::RateLimited("llm".into()).is_retryable());
        assert!(TriageError::Timeout("30s".into()).is_retryable());
    }

    #[test]
    fn non_retryable_kinds() {
        assert!(!TriageError::AuthExpired("x".into()).is_retryable());
        assert!(!TriageError::PermissionDenied("x".into()).is_retryable());
        assert!(!TriageError::Malformed("x".into()).is_retryable());
        assert!(!TriageError::ParseError("x".into()).is_retryable());
        assert!(!TriageError::IntegrityConflict("x".into()).is_retryable());
        assert!(!TriageError::Fatal("x".into()).is_retryable());
    }

    #[test]
    fn kind_tags() {
        assert_eq!(TriageError::Timeout("t".into()).kind(), "timeout");
        assert_eq!(
            TriageError::IntegrityConflict("dup".into()).kind(),
            "integrity_conflict"
        );
    }
}
