use async_trait::async_trait;

use crate::broker::TokenBroker;
use crate::error::AuthError;

/// A supplier of bearer tokens for outbound platform calls.
///
/// Gateways depend on this instead of the concrete broker so tests can
/// substitute a fixed token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid bearer token.
    async fn bearer_token(&self) -> Result<String, AuthError>;

    /// Force re-acquisition and return the fresh token. Called by gateways
    /// after the platform rejects a token mid-flight.
    async fn refresh_token(&self) -> Result<String, AuthError>;
}

#[async_trait]
impl TokenSource for TokenBroker {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok(self.get_token().await?.token)
    }

    async fn refresh_token(&self) -> Result<String, AuthError> {
        Ok(self.refresh().await?.token)
    }
}

/// A fixed token, for tests and local development.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    /// Create a source that always returns `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }

    async fn refresh_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_fixed_token() {
        let source = StaticTokenSource::new("tok");
        assert_eq!(source.bearer_token().await.unwrap(), "tok");
        assert_eq!(source.refresh_token().await.unwrap(), "tok");
    }
}
