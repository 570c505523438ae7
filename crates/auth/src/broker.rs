use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use triage_state::{KeyKind, StateKey, StateStore};

use crate::config::AuthConfig;
use crate::error::AuthError;

/// A platform access token with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The bearer token.
    pub token: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Valid iff more than five minutes of lifetime remain.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now() + chrono::Duration::minutes(5)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Acquires and caches platform tokens via the client-credentials grant.
///
/// One token per broker. Concurrent refreshers coalesce: the refresh runs
/// under a mutex, and waiters re-check the cache once they hold it.
/// Failed acquisitions feed a per-identifier lockout counter kept in the
/// state store; `max_failed_attempts` failures inside the lockout window
/// lock the identifier out until the window expires.
pub struct TokenBroker {
    config: AuthConfig,
    client: reqwest::Client,
    state: Arc<dyn StateStore>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenBroker {
    /// Create a broker over the given state store.
    pub fn new(config: AuthConfig, state: Arc<dyn StateStore>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Http(e.to_string()))?;

        Ok(Self {
            config,
            client,
            state,
            cached: Mutex::new(None),
        })
    }

    /// The identifier lockout and attempt counters are keyed by.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.config.client_id
    }

    /// Get a valid token, acquiring a fresh one when the cached token has
    /// less than five minutes of lifetime left.
    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        // Fast path outside the refresh lock.
        {
            let cached = self.cached.lock().await;
            if let Some(token) = cached.as_ref()
                && token.is_valid()
            {
                return Ok(token.clone());
            }
        }

        self.check_lockout().await?;

        // Single-flight: whoever holds the lock refreshes; everyone else
        // re-checks the cache the lock-holder just filled.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_valid()
        {
            return Ok(token.clone());
        }

        match self.acquire().await {
            Ok(token) => {
                self.clear_failures().await;
                *cached = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                if !e.is_retryable() {
                    self.record_failure().await;
                }
                Err(e)
            }
        }
    }

    /// Drop the cached token and acquire a fresh one. Equivalent to
    /// re-acquisition — there are no refresh tokens in service-account mode.
    pub async fn refresh(&self) -> Result<AccessToken, AuthError> {
        {
            let mut cached = self.cached.lock().await;
            *cached = None;
        }
        self.get_token().await
    }

    async fn acquire(&self) -> Result<AccessToken, AuthError> {
        let endpoint = self.config.token_endpoint();
        debug!(endpoint = %endpoint, "acquiring access token");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", self.config.scope.as_str()),
        ];

        let response = self
            .client
            .post(&endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or(body);
            warn!(status = %status, "token acquisition rejected");
            return Err(AuthError::Rejected(format!("HTTP {status}: {detail}")));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::UnexpectedResponse(format!("bad token body: {e}")))?;

        let expires_in = parsed.expires_in.unwrap_or(3600);
        let token = AccessToken {
            token: parsed.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        };

        // Best-effort cache mark so restarts can see how fresh the last
        // token was. The token itself stays in process memory.
        let ttl = expires_in
            .saturating_sub(300)
            .clamp(0, i64::try_from(self.config.token_cache_ttl_seconds).unwrap_or(i64::MAX));
        if ttl > 0 {
            let key = StateKey::new(KeyKind::Token, self.identifier());
            #[allow(clippy::cast_sign_loss)]
            if let Err(e) = self
                .state
                .set(
                    &key,
                    &token.expires_at.to_rfc3339(),
                    Some(Duration::from_secs(ttl as u64)),
                )
                .await
            {
                debug!(error = %e, "token cache write failed (ignored)");
            }
        }

        info!(expires_at = %token.expires_at, "access token acquired");
        Ok(token)
    }

    async fn check_lockout(&self) -> Result<(), AuthError> {
        let key = StateKey::new(KeyKind::Lockout, self.identifier());
        match self.state.get(&key).await {
            Ok(Some(_)) => Err(AuthError::LockedOut {
                identifier: self.identifier().to_owned(),
                retry_after_secs: self.config.lockout_duration_seconds,
            }),
            // Best-effort: a state outage must not block authentication.
            Ok(None) | Err(_) => Ok(()),
        }
    }

    async fn record_failure(&self) {
        let attempts_key = StateKey::new(KeyKind::AuthAttempts, self.identifier());
        let window = Duration::from_secs(self.config.lockout_duration_seconds);

        let count = match self.state.increment(&attempts_key, 1, Some(window)).await {
            Ok(count) => count,
            Err(e) => {
                debug!(error = %e, "failed-auth counter unavailable");
                return;
            }
        };

        warn!(
            identifier = self.identifier(),
            failures = count,
            "authentication failure recorded"
        );

        if count >= self.config.max_failed_attempts {
            let lockout_key = StateKey::new(KeyKind::Lockout, self.identifier());
            if self
                .state
                .set(&lockout_key, "1", Some(window))
                .await
                .is_ok()
            {
                warn!(
                    identifier = self.identifier(),
                    duration_secs = self.config.lockout_duration_seconds,
                    "identifier locked out after repeated authentication failures"
                );
            }
        }
    }

    async fn clear_failures(&self) {
        let attempts_key = StateKey::new(KeyKind::AuthAttempts, self.identifier());
        let _ = self.state.delete(&attempts_key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_state_memory::MemoryStateStore;

    struct MockAuthority {
        listener: tokio::net::TcpListener,
        base_url: String,
    }

    impl MockAuthority {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock authority");
            let port = listener.local_addr().unwrap().port();
            let base_url = format!("http://127.0.0.1:{port}");
            Self { listener, base_url }
        }

        async fn respond_once(&self, status_code: u16, body: &str) {
            let body = body.to_owned();
            let (mut stream, _) = self.listener.accept().await.unwrap();

            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let mut buf = vec![0u8; 8192];
            let _ = stream.read(&mut buf).await.unwrap();

            let response = format!(
                "HTTP/1.1 {status_code} OK\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\
                 \r\n\
                 {body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    }

    fn broker_for(url: &str, state: Arc<dyn StateStore>) -> TokenBroker {
        let config = AuthConfig::new("tenant-1", "client-1", "secret")
            .with_authority(url)
            .with_lockout(2, 900);
        TokenBroker::new(config, state).unwrap()
    }

    #[tokio::test]
    async fn acquires_and_caches_token() {
        let authority = MockAuthority::start().await;
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let broker = broker_for(&authority.base_url, Arc::clone(&state));

        let handle = tokio::spawn(async move {
            authority
                .respond_once(200, r#"{"access_token": "tok-1", "expires_in": 3600}"#)
                .await;
        });

        let first = broker.get_token().await.unwrap();
        handle.await.unwrap();
        assert_eq!(first.token, "tok-1");
        assert!(first.is_valid());

        // Second call is served from cache; the mock would panic on a
        // second request since it only answers once.
        let second = broker.get_token().await.unwrap();
        assert_eq!(second.token, "tok-1");
    }

    #[tokio::test]
    async fn rejection_counts_toward_lockout() {
        let authority = MockAuthority::start().await;
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let broker = broker_for(&authority.base_url, Arc::clone(&state));

        let handle = tokio::spawn(async move {
            authority
                .respond_once(401, r#"{"error": "invalid_client"}"#)
                .await;
            authority
                .respond_once(401, r#"{"error": "invalid_client"}"#)
                .await;
        });

        assert!(matches!(
            broker.get_token().await,
            Err(AuthError::Rejected(_))
        ));
        assert!(matches!(
            broker.get_token().await,
            Err(AuthError::Rejected(_))
        ));
        handle.await.unwrap();

        // Two failures hit the configured limit; the third attempt is
        // blocked before any HTTP traffic.
        assert!(matches!(
            broker.get_token().await,
            Err(AuthError::LockedOut { .. })
        ));
    }

    #[tokio::test]
    async fn near_expiry_token_is_refreshed() {
        let authority = MockAuthority::start().await;
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let broker = broker_for(&authority.base_url, Arc::clone(&state));

        let handle = tokio::spawn(async move {
            // 60s lifetime is inside the 5-minute validity buffer, so the
            // next get_token re-acquires.
            authority
                .respond_once(200, r#"{"access_token": "short", "expires_in": 60}"#)
                .await;
            authority
                .respond_once(200, r#"{"access_token": "fresh", "expires_in": 3600}"#)
                .await;
        });

        let first = broker.get_token().await.unwrap();
        assert_eq!(first.token, "short");
        assert!(!first.is_valid());

        let second = broker.get_token().await.unwrap();
        assert_eq!(second.token, "fresh");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn refresh_discards_cached_token() {
        let authority = MockAuthority::start().await;
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let broker = broker_for(&authority.base_url, Arc::clone(&state));

        let handle = tokio::spawn(async move {
            authority
                .respond_once(200, r#"{"access_token": "one", "expires_in": 3600}"#)
                .await;
            authority
                .respond_once(200, r#"{"access_token": "two", "expires_in": 3600}"#)
                .await;
        });

        assert_eq!(broker.get_token().await.unwrap().token, "one");
        assert_eq!(broker.refresh().await.unwrap().token, "two");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn garbled_body_is_unexpected_response() {
        let authority = MockAuthority::start().await;
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let broker = broker_for(&authority.base_url, Arc::clone(&state));

        let handle = tokio::spawn(async move {
            authority.respond_once(200, "not json").await;
        });

        assert!(matches!(
            broker.get_token().await,
            Err(AuthError::UnexpectedResponse(_))
        ));
        handle.await.unwrap();
    }
}
