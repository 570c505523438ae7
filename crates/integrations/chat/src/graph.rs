use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use triage_auth::{AuthError, TokenSource};
use triage_core::GroupId;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::gateway::{ChatGateway, GroupSpec, GroupSummary};

/// REST implementation of [`ChatGateway`] against a Graph-shaped chat API.
pub struct GraphChatGateway {
    config: ChatConfig,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
struct DirectoryUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedGroup {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GroupList {
    #[serde(default)]
    value: Vec<GroupEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    description: Option<String>,
}

fn auth_err(e: AuthError) -> ChatError {
    match e {
        AuthError::Http(msg) => ChatError::Transient(msg),
        other => ChatError::AuthExpired(other.to_string()),
    }
}

fn transport_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Transient(format!("timeout: {e}"))
    } else {
        ChatError::Transient(e.to_string())
    }
}

/// Derive a mail nickname from a display name: lowercase alphanumerics
/// only, truncated to 50 characters.
fn mail_nickname(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(50)
        .collect()
}

impl GraphChatGateway {
    /// Create a gateway with the given configuration and token source.
    pub fn new(config: ChatConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ChatError::Transient(e.to_string()))?;

        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_authorized<F>(&self, make: F) -> Result<reqwest::Response, ChatError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self.tokens.bearer_token().await.map_err(auth_err)?;
        let response = make(&self.client)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_err)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("token rejected mid-flight, refreshing and retrying once");
        let fresh = self.tokens.refresh_token().await.map_err(auth_err)?;
        let retry = make(&self.client)
            .bearer_auth(&fresh)
            .send()
            .await
            .map_err(transport_err)?;

        if retry.status() == StatusCode::UNAUTHORIZED {
            let body = retry.text().await.unwrap_or_default();
            return Err(ChatError::PermissionDenied(format!(
                "still unauthorized after refresh: {body}"
            )));
        }
        Ok(retry)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChatError::from_status(status, &body))
    }

    /// Resolve one member address to a directory id. `None` when the
    /// directory does not know the address.
    async fn resolve_member(&self, address: &str) -> Result<Option<String>, ChatError> {
        let url = self.url(&format!("users/{address}"));
        let response = self
            .send_authorized(|client| client.get(&url).query(&[("$select", "id")]))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response).await?;
        let user: DirectoryUser = response
            .json()
            .await
            .map_err(|e| ChatError::Malformed(format!("bad user body: {e}")))?;
        Ok(Some(user.id))
    }

    async fn add_member(&self, group_id: &str, directory_id: &str) -> Result<(), ChatError> {
        let url = self.url(&format!("groups/{group_id}/members/$ref"));
        let payload = serde_json::json!({
            "@odata.id": format!(
                "{}/directoryObjects/{directory_id}",
                self.config.base_url.trim_end_matches('/')
            ),
        });
        let response = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Enable team features on a freshly created group.
    async fn enable_team(&self, group_id: &str) -> Result<(), ChatError> {
        let url = self.url("teams");
        let base = self.config.base_url.trim_end_matches('/');
        let payload = serde_json::json!({
            "template@odata.bind": format!("{base}/teamsTemplates('standard')"),
            "group@odata.bind": format!("{base}/groups('{group_id}')"),
        });
        let response = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Poll until the group is message-ready, bounded by the configured
    /// attempt budget.
    async fn wait_for_provisioning(&self, group_id: &str) -> Result<(), ChatError> {
        let url = self.url(&format!("teams/{group_id}"));
        for attempt in 0..self.config.provision_attempts {
            let response = self.send_authorized(|client| client.get(&url)).await?;
            if response.status().is_success() {
                debug!(group_id, attempt, "group is provisioned");
                return Ok(());
            }
            debug!(group_id, attempt, "group not yet provisioned");
            tokio::time::sleep(Duration::from_millis(self.config.provision_delay_ms)).await;
        }
        Err(ChatError::PartialProvisioning(group_id.to_owned()))
    }
}

#[async_trait]
impl ChatGateway for GraphChatGateway {
    #[instrument(skip(self, spec), fields(group_name = %spec.name))]
    async fn create_group(&self, spec: &GroupSpec) -> Result<GroupId, ChatError> {
        // Resolve members first so a group is never created with nobody in
        // it. Unresolvable addresses are logged and skipped.
        let mut directory_ids = Vec::new();
        for address in &spec.members {
            match self.resolve_member(address).await {
                Ok(Some(id)) => directory_ids.push(id),
                Ok(None) => {
                    warn!(address, "member address did not resolve, skipping");
                }
                Err(e) => {
                    warn!(address, error = %e, "member resolution failed, skipping");
                }
            }
        }
        if directory_ids.is_empty() {
            return Err(ChatError::NoMembersResolved);
        }

        let url = self.url("groups");
        let payload = serde_json::json!({
            "displayName": spec.name,
            "description": spec.description,
            "groupTypes": ["Unified"],
            "mailEnabled": true,
            "mailNickname": mail_nickname(&spec.name),
            "securityEnabled": false,
            "visibility": "Private",
        });

        let response = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        let response = Self::expect_success(response).await?;
        let created: CreatedGroup = response
            .json()
            .await
            .map_err(|e| ChatError::Malformed(format!("bad group body: {e}")))?;

        for directory_id in &directory_ids {
            if let Err(e) = self.add_member(&created.id, directory_id).await {
                warn!(group_id = %created.id, error = %e, "failed to add member, skipping");
            }
        }

        if let Err(e) = self.enable_team(&created.id).await {
            warn!(group_id = %created.id, error = %e, "team enablement deferred");
        }

        info!(
            group_id = %created.id,
            members = directory_ids.len(),
            "responder group created"
        );
        Ok(GroupId::new(created.id))
    }

    #[instrument(skip(self, html_body), fields(group_id = %group_id))]
    async fn post_message(&self, group_id: &GroupId, html_body: &str) -> Result<(), ChatError> {
        self.wait_for_provisioning(group_id.as_str()).await?;

        let url = self.url(&format!("teams/{group_id}/primaryChannel/messages"));
        let payload = serde_json::json!({
            "body": {
                "contentType": "html",
                "content": html_body,
            }
        });

        let response = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        Self::expect_success(response).await?;
        info!("message posted");
        Ok(())
    }

    async fn list_groups(&self, prefix: &str) -> Result<Vec<GroupSummary>, ChatError> {
        let url = self.url("groups");
        let filter = format!("startswith(displayName,'{prefix}')");
        let response = self
            .send_authorized(|client| client.get(&url).query(&[("$filter", filter.as_str())]))
            .await?;
        let response = Self::expect_success(response).await?;
        let list: GroupList = response
            .json()
            .await
            .map_err(|e| ChatError::Malformed(format!("bad group list: {e}")))?;

        Ok(list
            .value
            .into_iter()
            .map(|g| GroupSummary {
                group_id: GroupId::new(g.id),
                name: g.display_name.unwrap_or_default(),
                created_at: g.created_date_time,
                description: g.description,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_auth::StaticTokenSource;

    struct MockChatServer {
        listener: tokio::net::TcpListener,
        base_url: String,
    }

    impl MockChatServer {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock server");
            let port = listener.local_addr().unwrap().port();
            let base_url = format!("http://127.0.0.1:{port}");
            Self { listener, base_url }
        }

        async fn respond_once(&self, status_code: u16, body: &str) -> String {
            let body = body.to_owned();
            let (mut stream, _) = self.listener.accept().await.unwrap();

            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let mut buf = vec![0u8; 32768];
            let n = stream.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).into_owned();

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
            request
        }
    }

    fn gateway(url: &str) -> GraphChatGateway {
        let config = ChatConfig::new()
            .with_base_url(url)
            .with_provisioning(2, 5);
        GraphChatGateway::new(config, Arc::new(StaticTokenSource::new("tok"))).unwrap()
    }

    fn spec() -> GroupSpec {
        GroupSpec {
            name: "EmailBot-SUPPORT-20240601-1000-password-reset".to_owned(),
            description: "escalation".to_owned(),
            members: vec!["admin@example.com".to_owned(), "ghost@example.com".to_owned()],
            owner: "bot@example.com".to_owned(),
        }
    }

    #[test]
    fn mail_nickname_strips_punctuation() {
        assert_eq!(
            mail_nickname("EmailBot-SUPPORT-20240601"),
            "emailbotsupport20240601"
        );
        assert_eq!(mail_nickname(""), "");
    }

    #[tokio::test]
    async fn create_group_skips_unresolved_members() {
        let server = MockChatServer::start().await;
        let gw = gateway(&server.base_url);

        let handle = tokio::spawn(async move {
            // First member resolves, second does not.
            server.respond_once(200, r#"{"id": "user-1"}"#).await;
            server.respond_once(404, "not found").await;
            // Group creation.
            server.respond_once(201, r#"{"id": "group-1"}"#).await;
            // One member add.
            server.respond_once(204, "").await;
            // Team enablement.
            server.respond_once(202, "").await;
        });

        let group_id = gw.create_group(&spec()).await.unwrap();
        handle.await.unwrap();
        assert_eq!(group_id.as_str(), "group-1");
    }

    #[tokio::test]
    async fn create_group_with_no_resolvable_members_fails() {
        let server = MockChatServer::start().await;
        let gw = gateway(&server.base_url);

        let handle = tokio::spawn(async move {
            server.respond_once(404, "not found").await;
            server.respond_once(404, "not found").await;
        });

        let err = gw.create_group(&spec()).await.unwrap_err();
        handle.await.unwrap();
        assert!(matches!(err, ChatError::NoMembersResolved));
    }

    #[tokio::test]
    async fn post_message_waits_for_provisioning() {
        let server = MockChatServer::start().await;
        let gw = gateway(&server.base_url);

        let handle = tokio::spawn(async move {
            // First provisioning probe misses, second hits, then the post.
            server.respond_once(404, "not ready").await;
            server.respond_once(200, r#"{"id": "group-1"}"#).await;
            let post = server.respond_once(201, "{}").await;
            assert!(post.contains("primaryChannel/messages"));
        });

        gw.post_message(&GroupId::new("group-1"), "<h2>Escalation</h2>")
            .await
            .unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn provisioning_budget_exhaustion_is_partial() {
        let server = MockChatServer::start().await;
        let gw = gateway(&server.base_url);

        let handle = tokio::spawn(async move {
            server.respond_once(404, "not ready").await;
            server.respond_once(404, "not ready").await;
        });

        let err = gw
            .post_message(&GroupId::new("group-1"), "<p>x</p>")
            .await
            .unwrap_err();
        handle.await.unwrap();
        assert!(matches!(err, ChatError::PartialProvisioning(_)));
    }

    #[tokio::test]
    async fn list_groups_parses_entries() {
        let server = MockChatServer::start().await;
        let gw = gateway(&server.base_url);

        let handle = tokio::spawn(async move {
            let request = server
                .respond_once(
                    200,
                    r#"{"value": [{
                        "id": "group-1",
                        "displayName": "EmailBot-SUPPORT-x",
                        "createdDateTime": "2024-06-01T10:00:00Z",
                        "description": "escalation"
                    }]}"#,
                )
                .await;
            assert!(request.contains("startswith"));
        });

        let groups = gw.list_groups("EmailBot-").await.unwrap();
        handle.await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "EmailBot-SUPPORT-x");
    }
}
