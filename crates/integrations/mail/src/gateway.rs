use async_trait::async_trait;
use chrono::{DateTime, Utc};

use triage_core::{EmailId, EmailMessage};

use crate::error::MailError;

/// Result of a connectivity probe against the mailbox.
#[derive(Debug, Clone)]
pub struct MailProbe {
    /// The monitored mailbox address.
    pub mailbox: String,
    /// Mailbox display name, when the platform reports one.
    pub display_name: Option<String>,
    /// Whether a test message listing succeeded.
    pub can_read_messages: bool,
    /// When the probe ran.
    pub probed_at: DateTime<Utc>,
}

/// Trait adapting the mail platform's API to internal types.
///
/// Implementations must be `Send + Sync` to be shared across worker tasks.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Fetch unread messages, oldest first, at most the configured batch
    /// size, each fully populated (plain body extracted from HTML when the
    /// platform only delivers HTML).
    async fn fetch_unread(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailMessage>, MailError>;

    /// Send a reply to the original sender. The subject gains a `Re:`
    /// prefix unless one is already present. At-most-once delivery is the
    /// caller's responsibility (guard on the processing record).
    async fn send_reply(
        &self,
        original: &EmailMessage,
        body: &str,
        html: bool,
    ) -> Result<(), MailError>;

    /// Mark a message read. Tolerates messages that are already read.
    async fn mark_read(&self, id: &EmailId) -> Result<(), MailError>;

    /// Fetch a single message by id.
    async fn get_message(&self, id: &EmailId) -> Result<Option<EmailMessage>, MailError>;

    /// Move a message into a folder.
    async fn move_to_folder(&self, id: &EmailId, folder_id: &str) -> Result<(), MailError>;

    /// Create a mail folder and return its id.
    async fn create_folder(&self, name: &str) -> Result<String, MailError>;

    /// Probe mailbox connectivity and capabilities.
    async fn connectivity_probe(&self) -> Result<MailProbe, MailError>;
}
