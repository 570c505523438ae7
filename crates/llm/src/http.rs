use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::client::{LlmClient, LlmReply};
use crate::config::LlmConfig;
use crate::error::LlmError;

/// HTTP-based LLM client using an OpenAI-compatible chat completions API.
///
/// Retries transport failures, 5xx responses, 429s and empty-choice replies
/// with exponential backoff (`base * 2^attempt`); other 4xx responses fail
/// immediately.
#[derive(Debug)]
pub struct HttpLlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn attempt(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmReply, LlmError> {
        let request_body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ]
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_seconds)
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("LLM API rate limit hit");
            return Err(LlmError::RateLimited);
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!("HTTP {status}: {body}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {body}")));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::UnexpectedResponse(format!("failed to parse body: {e}")))?;

        let content = response_json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                LlmError::UnexpectedResponse(format!("no choices in response: {response_json}"))
            })?;

        if content.trim().is_empty() {
            return Err(LlmError::UnexpectedResponse("empty reply content".into()));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let tokens_used = response_json
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(serde_json::Value::as_u64)
            .map(|t| t as u32);

        let model = response_json
            .get("model")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&self.config.model)
            .to_owned();

        Ok(LlmReply {
            content: content.to_owned(),
            model,
            tokens_used,
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<LlmReply, LlmError> {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            debug!(
                endpoint = %self.config.endpoint,
                model = %self.config.model,
                attempt,
                "sending LLM request"
            );

            match self.attempt(system_prompt, user_prompt).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "LLM call failed, will retry");
                    last_error = Some(e);
                    if attempt + 1 < self.config.max_retries {
                        let delay = self.config.retry_base_delay_ms * (1 << attempt);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.config.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockLlmServer {
        listener: tokio::net::TcpListener,
        base_url: String,
    }

    impl MockLlmServer {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock server");
            let port = listener.local_addr().unwrap().port();
            let base_url = format!("http://127.0.0.1:{port}");
            Self { listener, base_url }
        }

        async fn respond_once(&self, status_code: u16, body: &str) {
            let body = body.to_owned();
            let (mut stream, _) = self.listener.accept().await.unwrap();

            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let mut buf = vec![0u8; 16384];
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

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "model": "gpt-4",
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"total_tokens": 42}
        })
        .to_string()
    }

    fn config(url: &str) -> LlmConfig {
        LlmConfig::new(format!("{url}/v1/chat/completions"), "gpt-4", "sk-test")
            .with_max_retries(2)
            .with_retry_base_delay_ms(5)
    }

    #[tokio::test]
    async fn complete_success() {
        let server = MockLlmServer::start().await;
        let client = HttpLlmClient::new(config(&server.base_url)).unwrap();

        let server_handle = tokio::spawn(async move {
            server
                .respond_once(200, &completion_body("{\"category\": \"SUPPORT\"}"))
                .await;
        });

        let reply = client.complete("system", "user").await.unwrap();
        server_handle.await.unwrap();

        assert_eq!(reply.content, "{\"category\": \"SUPPORT\"}");
        assert_eq!(reply.model, "gpt-4");
        assert_eq!(reply.tokens_used, Some(42));
    }

    #[tokio::test]
    async fn retries_server_error_then_succeeds() {
        let server = MockLlmServer::start().await;
        let client = HttpLlmClient::new(config(&server.base_url)).unwrap();

        let server_handle = tokio::spawn(async move {
            server.respond_once(500, "oops").await;
            server.respond_once(200, &completion_body("ok")).await;
        });

        let reply = client.complete("system", "user").await.unwrap();
        server_handle.await.unwrap();
        assert_eq!(reply.content, "ok");
    }

    #[tokio::test]
    async fn empty_choices_is_retried_then_exhausted() {
        let server = MockLlmServer::start().await;
        let client = HttpLlmClient::new(config(&server.base_url)).unwrap();

        let server_handle = tokio::spawn(async move {
            server.respond_once(200, r#"{"choices": []}"#).await;
            server.respond_once(200, r#"{"choices": []}"#).await;
        });

        let err = client.complete("system", "user").await.unwrap_err();
        server_handle.await.unwrap();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockLlmServer::start().await;
        let client = HttpLlmClient::new(config(&server.base_url)).unwrap();

        let server_handle = tokio::spawn(async move {
            server.respond_once(400, "bad request").await;
        });

        let err = client.complete("system", "user").await.unwrap_err();
        server_handle.await.unwrap();
        assert!(matches!(err, LlmError::Api(_)));
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let server = MockLlmServer::start().await;
        let client = HttpLlmClient::new(config(&server.base_url)).unwrap();

        let server_handle = tokio::spawn(async move {
            server.respond_once(429, "slow down").await;
            server.respond_once(200, &completion_body("fine")).await;
        });

        let reply = client.complete("system", "user").await.unwrap();
        server_handle.await.unwrap();
        assert_eq!(reply.content, "fine");
    }
}
