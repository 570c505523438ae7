/// Configuration for the HTTP LLM client.
#[derive(Clone)]
pub struct LlmConfig {
    /// Chat-completions endpoint of an OpenAI-compatible API.
    pub endpoint: String,
    /// Model to use (e.g. `gpt-4`).
    pub model: String,
    /// API key for authentication.
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens in the reply.
    pub max_tokens: u32,
    /// Maximum attempts for retryable failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds. The delay before
    /// attempt `n` is `base * 2^n`.
    pub retry_base_delay_ms: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LlmConfig {
    /// Create a config with the given endpoint, model, and API key.
    ///
    /// Defaults: 30 s timeout, temperature 0.1, 300 max tokens, 3 retries
    /// with a 1 s backoff base.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout_seconds: 30,
            temperature: 0.1,
            max_tokens: 300,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
        }
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum reply tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base delay in milliseconds.
    #[must_use]
    pub fn with_retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.retry_base_delay_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LlmConfig::new("http://localhost:8080/v1/chat/completions", "gpt-4", "sk-x");
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn builder() {
        let config = LlmConfig::new("http://localhost/v1", "gpt-4", "sk-x")
            .with_timeout(10)
            .with_temperature(0.0)
            .with_max_tokens(512)
            .with_max_retries(1)
            .with_retry_base_delay_ms(50);
        assert_eq!(config.timeout_seconds, 10);
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_base_delay_ms, 50);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = LlmConfig::new("http://localhost/v1", "gpt-4", "sk-secret-value");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret-value"));
    }
}
