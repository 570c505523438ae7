use thiserror::Error;

/// Errors that can occur in a state store backend.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backend could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored value could not be interpreted.
    #[error("serialization error: {0}")]
    Serialization(String),
}
