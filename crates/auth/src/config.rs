/// Configuration for the platform token broker.
#[derive(Clone)]
pub struct AuthConfig {
    /// Directory tenant id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret for the credentials grant.
    pub client_secret: String,
    /// Authority base URL. The token endpoint is
    /// `{authority}/{tenant_id}/oauth2/v2.0/token`.
    pub authority: String,
    /// Scope requested for the token.
    pub scope: String,
    /// Expected `aud` claim for inbound token validation.
    pub audience: String,
    /// Expected `iss` claim prefix for inbound token validation.
    pub issuer_prefix: String,
    /// Maximum age of the `iat` claim, in seconds.
    pub max_token_age_seconds: i64,
    /// TTL for cached tokens, in seconds. Capped by the token lifetime.
    pub token_cache_ttl_seconds: u64,
    /// Failed attempts before an identifier is locked out.
    pub max_failed_attempts: i64,
    /// Lockout duration in seconds.
    pub lockout_duration_seconds: u64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authority", &self.authority)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Create a config with platform defaults for the given credentials.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let tenant_id = tenant_id.into();
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority: "https://login.microsoftonline.com".to_owned(),
            scope: "https://graph.microsoft.com/.default".to_owned(),
            audience: "https://graph.microsoft.com".to_owned(),
            issuer_prefix: "https://login.microsoftonline.com/".to_owned(),
            max_token_age_seconds: 24 * 3600,
            token_cache_ttl_seconds: 3600,
            max_failed_attempts: 5,
            lockout_duration_seconds: 900,
            tenant_id,
        }
    }

    /// Override the authority base URL.
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Override the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Override the lockout policy.
    #[must_use]
    pub fn with_lockout(mut self, max_failed_attempts: i64, duration_seconds: u64) -> Self {
        self.max_failed_attempts = max_failed_attempts;
        self.lockout_duration_seconds = duration_seconds;
        self
    }

    /// The token endpoint for this tenant.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_endpoint_shape() {
        let config = AuthConfig::new("tenant-1", "client-1", "secret");
        assert_eq!(
            config.token_endpoint(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
    }

    #[test]
    fn trailing_slash_authority() {
        let config =
            AuthConfig::new("t", "c", "s").with_authority("https://login.example.com/");
        assert_eq!(
            config.token_endpoint(),
            "https://login.example.com/t/oauth2/v2.0/token"
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let config = AuthConfig::new("t", "c", "super-secret");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }
}
