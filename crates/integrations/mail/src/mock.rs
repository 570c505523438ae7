use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use triage_core::{EmailId, EmailMessage};

use crate::error::MailError;
use crate::gateway::{MailGateway, MailProbe};

/// A recorded outbound reply.
#[derive(Debug, Clone)]
pub struct SentReply {
    pub email_id: EmailId,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html: bool,
}

#[derive(Default)]
struct Inner {
    queue: Vec<EmailMessage>,
    sent: Vec<SentReply>,
    read: HashSet<String>,
    fail_send_with: Option<String>,
    fail_fetch_with: Option<String>,
}

/// In-memory [`MailGateway`] for pipeline tests.
///
/// Messages queued with [`push_email`](Self::push_email) are returned by the
/// next `fetch_unread`; replies and read marks are recorded for assertions.
#[derive(Default)]
pub struct MockMailGateway {
    inner: Mutex<Inner>,
}

impl MockMailGateway {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for the next fetch.
    pub fn push_email(&self, email: EmailMessage) {
        self.lock().queue.push(email);
    }

    /// Make every `send_reply` fail with a transient error.
    pub fn fail_sends(&self, message: impl Into<String>) {
        self.lock().fail_send_with = Some(message.into());
    }

    /// Make every `fetch_unread` fail with a transient error.
    pub fn fail_fetches(&self, message: impl Into<String>) {
        self.lock().fail_fetch_with = Some(message.into());
    }

    /// Replies sent so far.
    pub fn sent_replies(&self) -> Vec<SentReply> {
        self.lock().sent.clone()
    }

    /// Whether the given message was marked read.
    pub fn is_read(&self, id: &EmailId) -> bool {
        self.lock().read.contains(id.as_str())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock mail lock poisoned")
    }
}

#[async_trait]
impl MailGateway for MockMailGateway {
    async fn fetch_unread(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmailMessage>, MailError> {
        let mut inner = self.lock();
        if let Some(ref msg) = inner.fail_fetch_with {
            return Err(MailError::Transient(msg.clone()));
        }
        let mut batch: Vec<EmailMessage> = std::mem::take(&mut inner.queue)
            .into_iter()
            .filter(|e| since.is_none_or(|s| e.received_at > s))
            .collect();
        batch.sort_by_key(|e| e.received_at);
        Ok(batch)
    }

    async fn send_reply(
        &self,
        original: &EmailMessage,
        body: &str,
        html: bool,
    ) -> Result<(), MailError> {
        let mut inner = self.lock();
        if let Some(ref msg) = inner.fail_send_with {
            return Err(MailError::Transient(msg.clone()));
        }
        let subject = if original.subject.trim_start().to_ascii_lowercase().starts_with("re:") {
            original.subject.clone()
        } else {
            format!("Re: {}", original.subject)
        };
        inner.sent.push(SentReply {
            email_id: original.id.clone(),
            to: original.sender_address.clone(),
            subject,
            body: body.to_owned(),
            html,
        });
        Ok(())
    }

    async fn mark_read(&self, id: &EmailId) -> Result<(), MailError> {
        self.lock().read.insert(id.as_str().to_owned());
        Ok(())
    }

    async fn get_message(&self, _id: &EmailId) -> Result<Option<EmailMessage>, MailError> {
        Ok(None)
    }

    async fn move_to_folder(&self, _id: &EmailId, _folder_id: &str) -> Result<(), MailError> {
        Ok(())
    }

    async fn create_folder(&self, name: &str) -> Result<String, MailError> {
        Ok(format!("folder-{name}"))
    }

    async fn connectivity_probe(&self) -> Result<MailProbe, MailError> {
        Ok(MailProbe {
            mailbox: "mock@example.com".to_owned(),
            display_name: Some("Mock Mailbox".to_owned()),
            can_read_messages: true,
            probed_at: Utc::now(),
        })
    }
}
