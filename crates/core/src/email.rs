use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EmailId;

/// Lifecycle position of a message inside the processing pipeline.
///
/// Transitions are driven exclusively by the orchestrator and persisted in
/// order. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Received,
    Validating,
    Classifying,
    Analyzing,
    Routing,
    Responding,
    Escalating,
    Reviewing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Parse the persisted string form. `None` for unknown values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "received" => Some(Self::Received),
            "validating" => Some(Self::Validating),
            "classifying" => Some(Self::Classifying),
            "analyzing" => Some(Self::Analyzing),
            "routing" => Some(Self::Routing),
            "responding" => Some(Self::Responding),
            "escalating" => Some(Self::Escalating),
            "reviewing" => Some(Self::Reviewing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Stable string form used in persisted rows and audit records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Classifying => "classifying",
            Self::Analyzing => "analyzing",
            Self::Routing => "routing",
            Self::Responding => "responding",
            Self::Escalating => "escalating",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment metadata. Contents are never fetched in the base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// File name as reported by the mail platform.
    pub name: String,
    /// MIME content type.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// A message observed in the monitored mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Platform-assigned identifier. Unique.
    pub id: EmailId,

    /// Sender address.
    pub sender_address: String,

    /// Sender display name, when the platform provides one.
    pub sender_name: Option<String>,

    /// Recipient address (the monitored mailbox for the base flow).
    pub recipient_address: String,

    /// Subject line.
    pub subject: String,

    /// Plain-text body. Extracted from HTML when the platform only
    /// delivers an HTML body.
    pub body: String,

    /// Raw HTML body, when present.
    pub html_body: Option<String>,

    /// When the platform received the message.
    pub received_at: DateTime<Utc>,

    /// When processing reached a terminal state. Set iff the status is
    /// `Completed` or `Failed`.
    pub processed_at: Option<DateTime<Utc>>,

    /// Platform conversation/thread identifier.
    pub conversation_id: Option<String>,

    /// Platform importance marker (e.g. "normal", "high").
    pub importance: Option<String>,

    /// Attachment metadata only.
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,

    /// Current pipeline position.
    pub status: ProcessingStatus,

    /// Number of retry attempts consumed so far.
    #[serde(default)]
    pub retry_count: u32,

    /// Most recent error, when a stage failed.
    pub last_error: Option<String>,
}

impl EmailMessage {
    /// Create a freshly observed message in the `Received` state.
    #[must_use]
    pub fn new(
        id: impl Into<EmailId>,
        sender_address: impl Into<String>,
        recipient_address: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_address: sender_address.into(),
            sender_name: None,
            recipient_address: recipient_address.into(),
            subject: subject.into(),
            body: body.into(),
            html_body: None,
            received_at,
            processed_at: None,
            conversation_id: None,
            importance: None,
            attachments: Vec::new(),
            status: ProcessingStatus::Received,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Set the sender display name.
    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Set the raw HTML body.
    #[must_use]
    pub fn with_html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    /// Set the conversation identifier.
    #[must_use]
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Set the importance marker.
    #[must_use]
    pub fn with_importance(mut self, importance: impl Into<String>) -> Self {
        self.importance = Some(importance.into());
        self
    }

    /// Attach metadata entries.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<AttachmentMeta>) -> Self {
        self.attachments = attachments;
        self
    }

    /// The sender's domain, lowercased. Empty when the address has no `@`.
    #[must_use]
    pub fn sender_domain(&self) -> String {
        self.sender_address
            .rsplit_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EmailMessage {
        EmailMessage::new(
            "msg-1",
            "user@example.com",
            "support@example.org",
            "Password reset",
            "I forgot my password, please help.",
            Utc::now(),
        )
    }

    #[test]
    fn new_message_starts_received() {
        let email = sample();
        assert_eq!(email.status, ProcessingStatus::Received);
        assert!(email.processed_at.is_none());
        assert_eq!(email.retry_count, 0);
    }

    #[test]
    fn terminal_states() {
        assert!(ProcessingStatus::Completed.is_terminal());
        assert!(ProcessingStatus::Failed.is_terminal());
        assert!(!ProcessingStatus::Received.is_terminal());
        assert!(!ProcessingStatus::Responding.is_terminal());
    }

    #[test]
    fn sender_domain_extraction() {
        let email = sample();
        assert_eq!(email.sender_domain(), "example.com");

        let odd = EmailMessage::new("m", "not-an-address", "x@y", "s", "b", Utc::now());
        assert_eq!(odd.sender_domain(), "");
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&ProcessingStatus::Classifying).unwrap();
        assert_eq!(json, "\"classifying\"");
    }

    #[test]
    fn serde_roundtrip() {
        let email = sample()
            .with_sender_name("User")
            .with_html_body("<p>hi</p>")
            .with_importance("high");
        let json = serde_json::to_string(&email).unwrap();
        let back: EmailMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, email.id);
        assert_eq!(back.sender_name.as_deref(), Some("User"));
        assert_eq!(back.status, ProcessingStatus::Received);
    }
}
