use thiserror::Error;

/// Errors that can occur in the token broker.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP transport failure reaching the authority.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The authority rejected the credentials grant.
    #[error("token acquisition rejected: {0}")]
    Rejected(String),

    /// The authority returned a body we cannot interpret.
    #[error("unexpected authority response: {0}")]
    UnexpectedResponse(String),

    /// The identifier is locked out after repeated failures.
    #[error("identifier {identifier} locked out for {retry_after_secs}s")]
    LockedOut {
        identifier: String,
        retry_after_secs: u64,
    },

    /// An inbound token failed validation.
    #[error("token validation failed: {0}")]
    InvalidToken(String),
}

impl AuthError {
    /// Whether the failing operation may succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_retryable() {
        assert!(AuthError::Http("reset".into()).is_retryable());
        assert!(!AuthError::Rejected("bad secret".into()).is_retryable());
        assert!(
            !AuthError::LockedOut {
                identifier: "svc".into(),
                retry_after_secs: 900
            }
            .is_retryable()
        );
    }
}
