use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::email::ProcessingStatus;
use crate::types::EmailId;

/// Action selected by the routing decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    /// High confidence: generate a reply and send it.
    AutoReply,
    /// Medium confidence: generate a reply, store it for review, do not send.
    Draft,
    /// Low confidence: flag for a human, no reply.
    ManualReview,
    /// Elevated urgency or very low confidence: build a responder group.
    Escalate,
}

impl RoutingAction {
    /// Parse the persisted string form. `None` for unknown values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "auto_reply" => Some(Self::AutoReply),
            "draft" => Some(Self::Draft),
            "manual_review" => Some(Self::ManualReview),
            "escalate" => Some(Self::Escalate),
            _ => None,
        }
    }

    /// Stable string form used in persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoReply => "auto_reply",
            Self::Draft => "draft",
            Self::ManualReview => "manual_review",
            Self::Escalate => "escalate",
        }
    }
}

impl std::fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage wall-clock measurements for one processing attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageTimings {
    /// Total pipeline time for the message.
    pub processing_ms: u64,
    /// Time spent in the classification call.
    pub classification_ms: u64,
    /// Time spent generating a response, when one was generated.
    pub response_generation_ms: u64,
}

/// Record of one processing attempt for a message.
///
/// Typically one per email; retries after a `Failed` terminal record create
/// a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    /// Unique record identifier.
    pub id: String,

    /// The processed email.
    pub email_id: EmailId,

    /// Status at the end of the attempt.
    pub status: ProcessingStatus,

    /// When the attempt began.
    pub started_at: DateTime<Utc>,

    /// When the attempt reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// Human-readable description of what was done. Carries the draft text
    /// for `Draft` outcomes so reviewers can retrieve it from the store.
    pub action_taken: Option<String>,

    /// Whether a reply was actually sent.
    #[serde(default)]
    pub response_sent: bool,

    /// Whether a responder group was created.
    #[serde(default)]
    pub escalation_created: bool,

    /// Group id of the escalation, when one was created.
    pub escalation_ref: Option<String>,

    /// Stage timings for the attempt.
    #[serde(default)]
    pub timings: StageTimings,

    /// Error text when the attempt failed.
    pub error_message: Option<String>,

    /// Pipeline stage that was executing when the failure occurred.
    pub error_stage: Option<String>,

    /// Retry attempts consumed during this record's lifetime.
    #[serde(default)]
    pub retry_count: u32,

    /// The routing decision that was applied.
    pub routing_decision: Option<RoutingAction>,
}

impl ProcessingRecord {
    /// Begin a new attempt for the given email.
    #[must_use]
    pub fn begin(email_id: EmailId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email_id,
            status: ProcessingStatus::Received,
            started_at: Utc::now(),
            completed_at: None,
            action_taken: None,
            response_sent: false,
            escalation_created: false,
            escalation_ref: None,
            timings: StageTimings::default(),
            error_message: None,
            error_stage: None,
            retry_count: 0,
            routing_decision: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_open_ended() {
        let rec = ProcessingRecord::begin(EmailId::new("m-1"));
        assert_eq!(rec.status, ProcessingStatus::Received);
        assert!(rec.completed_at.is_none());
        assert!(!rec.response_sent);
        assert!(!rec.escalation_created);
    }

    #[test]
    fn action_wire_form() {
        assert_eq!(RoutingAction::AutoReply.as_str(), "auto_reply");
        let json = serde_json::to_string(&RoutingAction::ManualReview).unwrap();
        assert_eq!(json, "\"manual_review\"");
    }
}
