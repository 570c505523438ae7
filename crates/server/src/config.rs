//! Typed configuration, assembled once at startup.
//!
//! Values come from an optional TOML file and are then overridden by the
//! documented environment variables. Invalid combinations are rejected at
//! load, never at first use.

use std::collections::HashMap;

use serde::Deserialize;

use triage_core::{ConfidenceThresholds, TriageError};

/// HTTP server section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
        }
    }
}

/// Durable store section. Without a URL the in-memory backend is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Postgres connection URL. Empty selects the in-memory store.
    pub database_url: Option<String>,
    /// Table prefix for the Postgres backend.
    pub table_prefix: Option<String>,
}

/// Platform credentials section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authority: Option<String>,
    pub scope: Option<String>,
    pub token_cache_ttl: u64,
    pub max_failed_auth_attempts: i64,
    pub auth_lockout_duration: u64,
}

/// LLM platform section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_owned(),
            api_key: String::new(),
            model: "gpt-4".to_owned(),
            max_tokens: 300,
            temperature: 0.1,
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

/// Processing pipeline section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub polling_interval_minutes: u64,
    pub batch_size: u32,
    pub max_processing_time_minutes: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub confidence_threshold_auto: f64,
    pub confidence_threshold_suggest: f64,
    pub confidence_threshold_review: f64,
    pub max_email_body_length: usize,
    pub target_mailbox: String,
    pub owner_address: String,
    /// Role tag to responder addresses.
    pub expertise: HashMap<String, Vec<String>>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            polling_interval_minutes: 5,
            batch_size: 10,
            max_processing_time_minutes: 30,
            retry_attempts: 3,
            retry_delay_seconds: 60,
            confidence_threshold_auto: 85.0,
            confidence_threshold_suggest: 60.0,
            confidence_threshold_review: 40.0,
            max_email_body_length: 50_000,
            target_mailbox: String::new(),
            owner_address: "emailbot@example.com".to_owned(),
            expertise: HashMap::new(),
        }
    }
}

/// Rate limiter section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub requests: usize,
    pub window_seconds: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests: 100,
            window_seconds: 60,
        }
    }
}

/// Encryption section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionSection {
    /// Active key, 32 bytes as hex or base64.
    pub key: String,
    /// Id tagged onto new envelopes.
    pub key_id: String,
    /// Retired keys by id, still readable.
    pub retired_keys: HashMap<String, String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub server: ServerSection,
    pub store: StoreSection,
    pub auth: AuthSection,
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub rate_limit: RateLimitSection,
    pub encryption: EncryptionSection,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, TriageError> {
    match env_var(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| TriageError::ConfigInvalid(format!("{name} has an invalid value"))),
        None => Ok(None),
    }
}

macro_rules! override_from_env {
    ($target:expr, $name:literal) => {
        if let Some(value) = parse_env($name)? {
            $target = value;
        }
    };
}

impl TriageConfig {
    /// Load configuration: TOML file (when present) then environment
    /// overrides, then validation.
    pub fn load(path: Option<&str>) -> Result<Self, TriageError> {
        let mut config = match path {
            Some(path) if std::path::Path::new(path).exists() => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    TriageError::ConfigInvalid(format!("cannot read {path}: {e}"))
                })?;
                toml::from_str(&contents)
                    .map_err(|e| TriageError::ConfigInvalid(format!("bad TOML in {path}: {e}")))?
            }
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the documented environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), TriageError> {
        override_from_env!(self.pipeline.polling_interval_minutes, "POLLING_INTERVAL_MINUTES");
        override_from_env!(self.pipeline.batch_size, "BATCH_SIZE");
        override_from_env!(
            self.pipeline.max_processing_time_minutes,
            "MAX_PROCESSING_TIME_MINUTES"
        );
        override_from_env!(self.pipeline.retry_attempts, "RETRY_ATTEMPTS");
        override_from_env!(self.pipeline.retry_delay_seconds, "RETRY_DELAY_SECONDS");
        override_from_env!(
            self.pipeline.confidence_threshold_auto,
            "CONFIDENCE_THRESHOLD_AUTO"
        );
        override_from_env!(
            self.pipeline.confidence_threshold_suggest,
            "CONFIDENCE_THRESHOLD_SUGGEST"
        );
        override_from_env!(
            self.pipeline.confidence_threshold_review,
            "CONFIDENCE_THRESHOLD_REVIEW"
        );
        override_from_env!(self.pipeline.max_email_body_length, "MAX_EMAIL_BODY_LENGTH");
        if let Some(mailbox) = env_var("TARGET_MAILBOX") {
            self.pipeline.target_mailbox = mailbox;
        }

        if let Some(model) = env_var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = env_var("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(endpoint) = env_var("LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        override_from_env!(self.llm.max_tokens, "LLM_MAX_TOKENS");
        override_from_env!(self.llm.temperature, "LLM_TEMPERATURE");
        override_from_env!(self.llm.timeout_seconds, "LLM_TIMEOUT");
        override_from_env!(self.llm.max_retries, "LLM_MAX_RETRIES");

        override_from_env!(self.rate_limit.requests, "RATE_LIMIT_REQUESTS");
        override_from_env!(self.rate_limit.window_seconds, "RATE_LIMIT_WINDOW");

        if let Some(tenant) = env_var("AUTH_TENANT_ID") {
            self.auth.tenant_id = tenant;
        }
        if let Some(client) = env_var("AUTH_CLIENT_ID") {
            self.auth.client_id = client;
        }
        if let Some(secret) = env_var("AUTH_CLIENT_SECRET") {
            self.auth.client_secret = secret;
        }
        if let Some(authority) = env_var("AUTH_AUTHORITY") {
            self.auth.authority = Some(authority);
        }
        if let Some(scope) = env_var("AUTH_SCOPE") {
            self.auth.scope = Some(scope);
        }
        override_from_env!(self.auth.token_cache_ttl, "TOKEN_CACHE_TTL");
        override_from_env!(self.auth.max_failed_auth_attempts, "MAX_FAILED_AUTH_ATTEMPTS");
        override_from_env!(self.auth.auth_lockout_duration, "AUTH_LOCKOUT_DURATION");

        if let Some(key) = env_var("ENCRYPTION_KEY") {
            self.encryption.key = key;
        }
        if let Some(key_id) = env_var("ENCRYPTION_KEY_ID") {
            self.encryption.key_id = key_id;
        }
        if let Some(url) = env_var("DATABASE_URL") {
            self.store.database_url = Some(url);
        }

        if let Some(host) = env_var("HOST") {
            self.server.host = host;
        }
        override_from_env!(self.server.port, "PORT");

        Ok(())
    }

    /// The routing thresholds as a validated value.
    #[must_use]
    pub fn thresholds(&self) -> ConfidenceThresholds {
        ConfidenceThresholds {
            auto: self.pipeline.confidence_threshold_auto,
            suggest: self.pipeline.confidence_threshold_suggest,
            review: self.pipeline.confidence_threshold_review,
        }
    }

    /// Reject invalid combinations before anything is wired up.
    pub fn validate(&self) -> Result<(), TriageError> {
        self.thresholds().validate()?;

        if self.pipeline.polling_interval_minutes == 0 {
            return Err(TriageError::ConfigInvalid(
                "POLLING_INTERVAL_MINUTES must be at least 1".to_owned(),
            ));
        }
        if self.pipeline.batch_size == 0 {
            return Err(TriageError::ConfigInvalid(
                "BATCH_SIZE must be at least 1".to_owned(),
            ));
        }
        if self.rate_limit.requests == 0 {
            return Err(TriageError::ConfigInvalid(
                "RATE_LIMIT_REQUESTS must be at least 1".to_owned(),
            ));
        }
        if !self.encryption.key.is_empty() {
            triage_crypto::parse_master_key(&self.encryption.key)
                .map_err(|e| TriageError::ConfigInvalid(format!("ENCRYPTION_KEY: {e}")))?;
            if self.encryption.key_id.is_empty() {
                return Err(TriageError::ConfigInvalid(
                    "ENCRYPTION_KEY_ID is required when ENCRYPTION_KEY is set".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TriageConfig::default().validate().unwrap();
    }

    #[test]
    fn default_thresholds_match_contract() {
        let config = TriageConfig::default();
        let t = config.thresholds();
        assert_eq!(t.auto, 85.0);
        assert_eq!(t.suggest, 60.0);
        assert_eq!(t.review, 40.0);
    }

    #[test]
    fn bad_threshold_ordering_is_rejected() {
        let mut config = TriageConfig::default();
        config.pipeline.confidence_threshold_suggest = 90.0;
        assert!(matches!(
            config.validate(),
            Err(TriageError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = TriageConfig::default();
        config.pipeline.polling_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn encryption_key_requires_key_id() {
        let mut config = TriageConfig::default();
        config.encryption.key = "aa".repeat(32);
        assert!(config.validate().is_err());

        config.encryption.key_id = "k1".to_owned();
        config.validate().unwrap();
    }

    #[test]
    fn garbage_encryption_key_is_rejected() {
        let mut config = TriageConfig::default();
        config.encryption.key = "not-a-key".to_owned();
        config.encryption.key_id = "k1".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_sections_deserialize() {
        let config: TriageConfig = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [pipeline]
            batch_size = 25
            target_mailbox = "it@example.com"

            [pipeline.expertise]
            it_admin = ["admin@example.com"]

            [llm]
            model = "gpt-4o"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.pipeline.batch_size, 25);
        assert_eq!(config.pipeline.target_mailbox, "it@example.com");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(
            config.pipeline.expertise.get("it_admin").unwrap(),
            &vec!["admin@example.com".to_owned()]
        );
    }
}
