use std::sync::Arc;

use tracing::{debug, warn};

use triage_core::{Classification, EmailCategory, EmailMessage, UrgencyLevel};
use triage_llm::{LlmClient, json_envelope};

use crate::prompts::{CLASSIFY_SYSTEM, PROMPT_VERSION, classification_prompt};

/// Confidence assigned when fields were missing or out of contract.
const DEGRADED_CONFIDENCE_CAP: f64 = 25.0;

/// Classifies messages by prompting the LLM and normalizing its reply.
///
/// Never returns an error: an unreachable model or unusable output degrades
/// to [`Classification::fallback`] with confidence 0, which the router turns
/// into an immediate escalation.
pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    prompt_body_chars: usize,
}

impl Classifier {
    /// Create a classifier over the given model client.
    pub fn new(llm: Arc<dyn LlmClient>, prompt_body_chars: usize) -> Self {
        Self {
            llm,
            prompt_body_chars,
        }
    }

    /// Classify one message. The second tuple element is `true` when the
    /// fallback path was taken (model unreachable or output unparseable).
    pub async fn classify(&self, email: &EmailMessage) -> (Classification, bool) {
        let prompt = classification_prompt(email, self.prompt_body_chars);

        let reply = match self.llm.complete(CLASSIFY_SYSTEM, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(email_id = %email.id, error = %e, "classification call failed");
                return (Classification::fallback(&e.to_string()), true);
            }
        };

        let Some(envelope) = json_envelope(&reply.content) else {
            warn!(email_id = %email.id, "classification reply had no JSON envelope");
            return (
                Classification::fallback("unparseable model output"),
                true,
            );
        };

        let mut classification = normalize(&envelope);
        classification.model = reply.model;
        classification.prompt_version = PROMPT_VERSION.to_owned();
        classification.tokens_used = reply.tokens_used;

        debug!(
            email_id = %email.id,
            category = %classification.category,
            confidence = classification.confidence,
            urgency = %classification.urgency,
            "email classified"
        );
        (classification, false)
    }
}

/// Normalize a classification envelope into the closed contract.
///
/// Unknown enum values map to INFORMATION / MEDIUM with a "(normalized)"
/// marker on the reasoning; missing fields take the same defaults and cap
/// the confidence at 25. A confidence outside 0-100 (including 0-1 scale
/// replies) is rejected the same way as a missing one.
fn normalize(envelope: &serde_json::Value) -> Classification {
    let mut degraded = false;
    let mut normalized = false;

    let category = match envelope.get("category").and_then(|v| v.as_str()) {
        Some(raw) => match EmailCategory::parse(raw) {
            Some(category) => category,
            None => {
                normalized = true;
                EmailCategory::Information
            }
        },
        None => {
            degraded = true;
            EmailCategory::Information
        }
    };

    let urgency = match envelope.get("urgency").and_then(|v| v.as_str()) {
        Some(raw) => match UrgencyLevel::parse(raw) {
            Some(urgency) => urgency,
            None => {
                normalized = true;
                UrgencyLevel::Medium
            }
        },
        None => {
            degraded = true;
            UrgencyLevel::Medium
        }
    };

    let confidence = match envelope.get("confidence").and_then(serde_json::Value::as_f64) {
        Some(value) if value.is_finite() && (0.0..=100.0).contains(&value) => value,
        Some(_) | None => {
            // Out-of-contract scale (e.g. 0-1) is treated as missing.
            degraded = true;
            DEGRADED_CONFIDENCE_CAP
        }
    };

    let mut reasoning = envelope
        .get("reasoning")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| {
            degraded = true;
            "No reasoning provided".to_owned()
        });
    if normalized {
        reasoning.push_str(" (normalized)");
    }

    let suggested_action = envelope
        .get("suggested_action")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| {
            degraded = true;
            "Manual review required".to_owned()
        });

    let required_expertise = envelope
        .get("required_expertise")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default();

    let estimated_effort = envelope
        .get("estimated_effort")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown")
        .to_owned();

    Classification {
        category,
        confidence: if degraded {
            confidence.min(DEGRADED_CONFIDENCE_CAP)
        } else {
            confidence
        },
        reasoning,
        urgency,
        suggested_action,
        required_expertise,
        estimated_effort,
        model: String::new(),
        prompt_version: String::new(),
        tokens_used: None,
        human_feedback: None,
        feedback_notes: None,
        feedback_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_llm::{FailingLlmClient, MockLlmClient};

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

    fn well_formed_reply() -> String {
        serde_json::json!({
            "category": "SUPPORT",
            "confidence": 92,
            "reasoning": "password reset request",
            "urgency": "MEDIUM",
            "suggested_action": "send reset link",
            "required_expertise": ["helpdesk"],
            "estimated_effort": "minutes"
        })
        .to_string()
    }

    #[tokio::test]
    async fn classifies_well_formed_reply() {
        let classifier = Classifier::new(Arc::new(MockLlmClient::returning(well_formed_reply())), 2_000);
        let (c, fallback) = classifier.classify(&email()).await;

        assert!(!fallback);
        assert_eq!(c.category, EmailCategory::Support);
        assert_eq!(c.confidence, 92.0);
        assert_eq!(c.urgency, UrgencyLevel::Medium);
        assert_eq!(c.required_expertise, vec!["helpdesk".to_owned()]);
        assert_eq!(c.prompt_version, PROMPT_VERSION);
        assert_eq!(c.model, "mock");
    }

    #[tokio::test]
    async fn fenced_reply_is_accepted() {
        let reply = format!("```json\n{}\n```", well_formed_reply());
        let classifier = Classifier::new(Arc::new(MockLlmClient::returning(reply)), 2_000);
        let (c, fallback) = classifier.classify(&email()).await;
        assert!(!fallback);
        assert_eq!(c.category, EmailCategory::Support);
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_fallback() {
        let classifier = Classifier::new(Arc::new(FailingLlmClient::new("connection refused")), 2_000);
        let (c, fallback) = classifier.classify(&email()).await;

        assert!(fallback);
        assert_eq!(c.category, EmailCategory::Information);
        assert_eq!(c.confidence, 0.0);
        assert!(c.reasoning.starts_with("error:"));
    }

    #[tokio::test]
    async fn nonsense_reply_degrades_to_fallback() {
        let classifier = Classifier::new(
            Arc::new(MockLlmClient::returning("I cannot classify this email.")),
            2_000,
        );
        let (c, fallback) = classifier.classify(&email()).await;
        assert!(fallback);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn unknown_enums_are_normalized() {
        let envelope = serde_json::json!({
            "category": "SPAM",
            "confidence": 80,
            "reasoning": "looks odd",
            "urgency": "PANIC",
            "suggested_action": "x",
        });
        let c = normalize(&envelope);
        assert_eq!(c.category, EmailCategory::Information);
        assert_eq!(c.urgency, UrgencyLevel::Medium);
        assert!(c.reasoning.ends_with("(normalized)"));
        // Enum normalization alone does not cap confidence.
        assert_eq!(c.confidence, 80.0);
    }

    #[test]
    fn missing_fields_cap_confidence() {
        let envelope = serde_json::json!({
            "confidence": 95,
            "reasoning": "present",
            "urgency": "LOW",
            "suggested_action": "x",
        });
        let c = normalize(&envelope);
        assert_eq!(c.category, EmailCategory::Information);
        assert_eq!(c.confidence, 25.0);
    }

    #[test]
    fn zero_to_one_scale_is_rejected() {
        let envelope = serde_json::json!({
            "category": "SUPPORT",
            "confidence": 0.92,
            "reasoning": "fractional scale",
            "urgency": "LOW",
            "suggested_action": "x",
        });
        let c = normalize(&envelope);
        // In-range but fractional values are accepted (0.92 is within
        // 0-100); a value above 100 or below 0 is not.
        assert_eq!(c.confidence, 0.92);

        let envelope = serde_json::json!({
            "category": "SUPPORT",
            "confidence": 920,
            "reasoning": "wrong scale",
            "urgency": "LOW",
            "suggested_action": "x",
        });
        let c = normalize(&envelope);
        assert_eq!(c.confidence, 25.0);

        let envelope = serde_json::json!({
            "category": "SUPPORT",
            "confidence": -5,
            "reasoning": "negative",
            "urgency": "LOW",
            "suggested_action": "x",
        });
        let c = normalize(&envelope);
        assert_eq!(c.confidence, 25.0);
    }

    #[test]
    fn empty_expertise_is_allowed() {
        let envelope = serde_json::json!({
            "category": "SUPPORT",
            "confidence": 88,
            "reasoning": "fine",
            "urgency": "LOW",
            "suggested_action": "x",
            "required_expertise": [],
            "estimated_effort": "1 hour"
        });
        let c = normalize(&envelope);
        assert!(c.required_expertise.is_empty());
        assert_eq!(c.confidence, 88.0);
        assert_eq!(c.estimated_effort, "1 hour");
    }
}
