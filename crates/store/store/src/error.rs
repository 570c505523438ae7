use thiserror::Error;

use triage_core::TriageError;

/// Errors that can occur in a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored value could not be interpreted.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A sensitive field could not be encrypted or decrypted.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl From<StoreError> for TriageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => TriageError::Malformed(format!("not found: {msg}")),
            StoreError::Conflict(msg) => TriageError::IntegrityConflict(msg),
            StoreError::Connection(msg) => TriageError::TransientNetwork(msg),
            StoreError::Backend(msg) | StoreError::Serialization(msg) => {
                TriageError::Fatal(format!("store: {msg}"))
            }
            StoreError::Encryption(msg) => TriageError::Fatal(format!("encryption: {msg}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_integrity_conflict() {
        let err: TriageError = StoreError::Conflict("duplicate email".into()).into();
        assert!(matches!(err, TriageError::IntegrityConflict(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn connection_maps_to_transient() {
        let err: TriageError = StoreError::Connection("refused".into()).into();
        assert!(err.is_retryable());
    }
}
