use std::sync::Arc;

use tracing::{info, warn};

use triage_core::{Classification, EmailMessage, TriageError};
use triage_llm::LlmClient;
use triage_mail::MailGateway;

use crate::prompts::{RESPOND_SYSTEM, response_prompt};

/// Generates replies and, for auto-handled messages, sends them.
pub struct Responder {
    llm: Arc<dyn LlmClient>,
    mail: Arc<dyn MailGateway>,
    prompt_body_chars: usize,
}

impl Responder {
    /// Create a responder over the given model client and mail gateway.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        mail: Arc<dyn MailGateway>,
        prompt_body_chars: usize,
    ) -> Self {
        Self {
            llm,
            mail,
            prompt_body_chars,
        }
    }

    /// Generate a reply for the message. Falls back to a canned
    /// acknowledgement when the model is unreachable, so drafting never
    /// fails outright.
    pub async fn generate(
        &self,
        email: &EmailMessage,
        classification: &Classification,
    ) -> String {
        let prompt = response_prompt(email, classification, self.prompt_body_chars);

        match self.llm.complete(RESPOND_SYSTEM, &prompt).await {
            Ok(reply) => reply.content.trim().to_owned(),
            Err(e) => {
                warn!(email_id = %email.id, error = %e, "response generation failed, using canned text");
                format!(
                    "Thank you for your email. We have received your {} request \
                     and will respond as soon as possible.",
                    classification.category.as_str().to_lowercase()
                )
            }
        }
    }

    /// Generate and send a reply. Returns the sent text; the caller guards
    /// at-most-once delivery via the processing record.
    pub async fn respond(
        &self,
        email: &EmailMessage,
        classification: &Classification,
    ) -> Result<String, TriageError> {
        let reply = self.generate(email, classification).await;
        self.mail
            .send_reply(email, &reply, false)
            .await
            .map_err(TriageError::from)?;
        info!(email_id = %email.id, "automated reply sent");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::{EmailCategory, UrgencyLevel};
    use triage_llm::{FailingLlmClient, MockLlmClient};
    use triage_mail::MockMailGateway;

    fn email() -> EmailMessage {
        EmailMessage::new(
            "m-1",
            "user@example.com",
            "it@example.com",
            "Password reset",
            "I forgot my password, please help.",
            Utc::now(),
        )
    }

    fn classification() -> Classification {
        let mut c = Classification::fallback("unused");
        c.category = EmailCategory::Support;
        c.confidence = 92.0;
        c.urgency = UrgencyLevel::Medium;
        c
    }

    #[tokio::test]
    async fn respond_sends_generated_reply() {
        let mail = Arc::new(MockMailGateway::new());
        let responder = Responder::new(
            Arc::new(MockLlmClient::returning("We sent you a reset link.")),
            Arc::clone(&mail) as Arc<dyn MailGateway>,
            1_500,
        );

        let sent = responder.respond(&email(), &classification()).await.unwrap();
        assert_eq!(sent, "We sent you a reset link.");

        let replies = mail.sent_replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].subject, "Re: Password reset");
        assert_eq!(replies[0].to, "user@example.com");
    }

    #[tokio::test]
    async fn generation_failure_uses_canned_text() {
        let mail = Arc::new(MockMailGateway::new());
        let responder = Responder::new(
            Arc::new(FailingLlmClient::new("model down")),
            Arc::clone(&mail) as Arc<dyn MailGateway>,
            1_500,
        );

        let draft = responder.generate(&email(), &classification()).await;
        assert!(draft.contains("support request"));
    }

    #[tokio::test]
    async fn send_failure_surfaces_as_error() {
        let mail = Arc::new(MockMailGateway::new());
        mail.fail_sends("smtp down");
        let responder = Responder::new(
            Arc::new(MockLlmClient::returning("reply")),
            Arc::clone(&mail) as Arc<dyn MailGateway>,
            1_500,
        );

        let err = responder
            .respond(&email(), &classification())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(mail.sent_replies().is_empty());
    }
}
