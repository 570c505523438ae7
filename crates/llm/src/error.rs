use thiserror::Error;

/// Errors that can occur when talking to the LLM platform.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request did not complete within the timeout.
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    /// The API rejected the request (non-retryable 4xx).
    #[error("LLM API error: {0}")]
    Api(String),

    /// The API signalled rate limiting (HTTP 429).
    #[error("rate limited by LLM API")]
    RateLimited,

    /// The API returned a body we cannot interpret.
    #[error("unexpected LLM response: {0}")]
    UnexpectedResponse(String),

    /// The client was given invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// All retry attempts were exhausted.
    #[error("LLM call failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The final error, rendered.
        last_error: String,
    },
}

impl LlmError {
    /// Whether the failing call may succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout(_) | Self::RateLimited | Self::UnexpectedResponse(_)
        )
    }
}
