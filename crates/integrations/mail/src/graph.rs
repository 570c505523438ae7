use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use triage_auth::{AuthError, TokenSource};
use triage_core::{AttachmentMeta, EmailId, EmailMessage};

use crate::config::MailConfig;
use crate::error::MailError;
use crate::gateway::{MailGateway, MailProbe};
use crate::html::html_to_text;

/// REST implementation of [`MailGateway`] against a Graph-shaped mail API.
pub struct GraphMailGateway {
    config: MailConfig,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<GraphRecipient>,
    #[serde(default)]
    to_recipients: Vec<GraphRecipient>,
    received_date_time: DateTime<Utc>,
    #[serde(default)]
    body: Option<GraphBody>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    importance: Option<String>,
    #[serde(default)]
    attachments: Vec<GraphAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphAddress {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphFolder {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMailbox {
    #[serde(default)]
    display_name: Option<String>,
}

fn auth_err(e: AuthError) -> MailError {
    match e {
        AuthError::Http(msg) => MailError::Transient(msg),
        other => MailError::AuthExpired(other.to_string()),
    }
}

fn transport_err(e: reqwest::Error) -> MailError {
    if e.is_timeout() {
        MailError::Transient(format!("timeout: {e}"))
    } else {
        MailError::Transient(e.to_string())
    }
}

impl GraphMailGateway {
    /// Create a gateway with the given configuration and token source.
    pub fn new(config: MailConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| MailError::Transient(e.to_string()))?;

        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    fn mailbox_url(&self, path: &str) -> String {
        format!(
            "{}/users/{}/{path}",
            self.config.base_url.trim_end_matches('/'),
            self.config.mailbox
        )
    }

    /// Send a request, refreshing the token and retrying once when the
    /// platform rejects it mid-flight. A second rejection surfaces as
    /// permission denied.
    async fn send_authorized<F>(&self, make: F) -> Result<reqwest::Response, MailError>
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
            return Err(MailError::PermissionDenied(format!(
                "still unauthorized after refresh: {body}"
            )));
        }
        Ok(retry)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, MailError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(MailError::from_status(status, &body))
    }

    fn convert_message(&self, message: GraphMessage) -> EmailMessage {
        let sender_address = message
            .from
            .as_ref()
            .and_then(|r| r.email_address.as_ref())
            .and_then(|a| a.address.clone())
            .unwrap_or_default();
        let sender_name = message
            .from
            .as_ref()
            .and_then(|r| r.email_address.as_ref())
            .and_then(|a| a.name.clone());

        let recipient_address = message
            .to_recipients
            .first()
            .and_then(|r| r.email_address.as_ref())
            .and_then(|a| a.address.clone())
            .unwrap_or_else(|| self.config.mailbox.clone());

        let (body, html_body) = match &message.body {
            Some(b) if b.content_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("html")) => {
                let html = b.content.clone().unwrap_or_default();
                (html_to_text(&html), Some(html))
            }
            Some(b) => (b.content.clone().unwrap_or_default(), None),
            None => (String::new(), None),
        };

        let attachments = message
            .attachments
            .into_iter()
            .map(|a| AttachmentMeta {
                name: a.name.unwrap_or_default(),
                content_type: a.content_type.unwrap_or_default(),
                size_bytes: a.size.unwrap_or(0),
            })
            .collect();

        let mut email = EmailMessage::new(
            message.id,
            sender_address,
            recipient_address,
            message.subject.unwrap_or_default(),
            body,
            message.received_date_time,
        )
        .with_attachments(attachments);

        if let Some(name) = sender_name {
            email = email.with_sender_name(name);
        }
        if let Some(html) = html_body {
            email = email.with_html_body(html);
        }
        if let Some(conversation) = message.conversation_id {
            email = email.with_conversation_id(conversation);
        }
        if let Some(importance) = message.importance {
            email = email.with_importance(importance);
        }
        email
    }
}

/// Prefix a subject with `Re:` unless one is already present.
fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim_start();
    match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("re:") => subject.to_owned(),
        _ => format!("Re: {subject}"),
    }
}

#[async_trait]
impl MailGateway for GraphMailGateway {
    #[instrument(skip(self), fields(mailbox = %self.config.mailbox))]
    async fn fetch_unread(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailMessage>, MailError> {
        let mut filter = "isRead eq false".to_owned();
        if let Some(since) = since {
            filter = format!(
                "receivedDateTime gt {} and {filter}",
                since.format("%Y-%m-%dT%H:%M:%SZ")
            );
        }

        let url = self.mailbox_url("messages");
        let batch = self.config.batch_size.to_string();
        let response = self
            .send_authorized(|client| {
                client.get(&url).query(&[
                    ("$filter", filter.as_str()),
                    ("$orderby", "receivedDateTime asc"),
                    ("$top", batch.as_str()),
                    (
                        "$select",
                        "id,subject,from,toRecipients,receivedDateTime,body,conversationId,importance",
                    ),
                    ("$expand", "attachments($select=name,contentType,size)"),
                ])
            })
            .await?;
        let response = Self::expect_success(response).await?;

        let list: MessageList = response
            .json()
            .await
            .map_err(|e| MailError::Malformed(format!("bad message list: {e}")))?;

        let emails: Vec<EmailMessage> = list
            .value
            .into_iter()
            .map(|m| self.convert_message(m))
            .collect();

        info!(count = emails.len(), "fetched unread messages");
        Ok(emails)
    }

    #[instrument(skip(self, original, body), fields(email_id = %original.id))]
    async fn send_reply(
        &self,
        original: &EmailMessage,
        body: &str,
        html: bool,
    ) -> Result<(), MailError> {
        let payload = serde_json::json!({
            "message": {
                "subject": reply_subject(&original.subject),
                "body": {
                    "contentType": if html { "HTML" } else { "Text" },
                    "content": body,
                },
                "toRecipients": [{
                    "emailAddress": {
                        "address": original.sender_address,
                        "name": original.sender_name,
                    }
                }],
            },
            "saveToSentItems": true,
        });

        let url = self.mailbox_url("sendMail");
        let response = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        Self::expect_success(response).await?;

        info!(to = %original.sender_address, "reply sent");
        Ok(())
    }

    #[instrument(skip(self), fields(email_id = %id))]
    async fn mark_read(&self, id: &EmailId) -> Result<(), MailError> {
        let url = self.mailbox_url(&format!("messages/{id}"));
        let payload = serde_json::json!({ "isRead": true });

        let response = self
            .send_authorized(|client| client.patch(&url).json(&payload))
            .await?;
        // Marking read is idempotent on the platform side; any success
        // (including an already-read message) lands here.
        Self::expect_success(response).await?;
        debug!("marked read");
        Ok(())
    }

    async fn get_message(&self, id: &EmailId) -> Result<Option<EmailMessage>, MailError> {
        let url = self.mailbox_url(&format!("messages/{id}"));
        let response = self
            .send_authorized(|client| {
                client.get(&url).query(&[(
                    "$select",
                    "id,subject,from,toRecipients,receivedDateTime,body,conversationId,importance",
                )])
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response).await?;
        let message: GraphMessage = response
            .json()
            .await
            .map_err(|e| MailError::Malformed(format!("bad message: {e}")))?;
        Ok(Some(self.convert_message(message)))
    }

    async fn move_to_folder(&self, id: &EmailId, folder_id: &str) -> Result<(), MailError> {
        let url = self.mailbox_url(&format!("messages/{id}/move"));
        let payload = serde_json::json!({ "destinationId": folder_id });
        let response = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn create_folder(&self, name: &str) -> Result<String, MailError> {
        let url = self.mailbox_url("mailFolders");
        let payload = serde_json::json!({ "displayName": name });
        let response = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        let response = Self::expect_success(response).await?;
        let folder: GraphFolder = response
            .json()
            .await
            .map_err(|e| MailError::Malformed(format!("bad folder body: {e}")))?;
        info!(folder = name, id = %folder.id, "mail folder created");
        Ok(folder.id)
    }

    #[instrument(skip(self), fields(mailbox = %self.config.mailbox))]
    async fn connectivity_probe(&self) -> Result<MailProbe, MailError> {
        let mailbox_url = self.mailbox_url("");
        let response = self
            .send_authorized(|client| {
                client
                    .get(mailbox_url.trim_end_matches('/'))
                    .query(&[("$select", "displayName")])
            })
            .await?;
        let response = Self::expect_success(response).await?;
        let mailbox: GraphMailbox = response
            .json()
            .await
            .map_err(|e| MailError::Malformed(format!("bad mailbox body: {e}")))?;

        let messages_url = self.mailbox_url("messages");
        let can_read_messages = match self
            .send_authorized(|client| client.get(&messages_url).query(&[("$top", "1")]))
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "message listing probe failed");
                false
            }
        };

        Ok(MailProbe {
            mailbox: self.config.mailbox.clone(),
            display_name: mailbox.display_name,
            can_read_messages,
            probed_at: Utc::now(),
        })
    }
}
