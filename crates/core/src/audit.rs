use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An audit record for one observable action in the system. Append-only,
/// never mutated after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique record identifier.
    pub id: String,

    /// Event family, e.g. `pipeline`, `auth`, `gateway`.
    pub event_type: String,

    /// What happened, e.g. `stage_transition`, `reply_sent`.
    pub action: String,

    /// Acting identity, e.g. a client id or `scheduler`.
    pub actor: String,

    /// Session identifier when the event came from an HTTP caller.
    pub session_id: Option<String>,

    /// Source address when the event came from an HTTP caller.
    pub source_ip: Option<String>,

    /// User agent when the event came from an HTTP caller.
    pub user_agent: Option<String>,

    /// Kind of the touched resource, e.g. `email`, `escalation_group`.
    pub resource_type: Option<String>,

    /// Identifier of the touched resource.
    pub resource_id: Option<String>,

    /// Whether the action succeeded.
    pub success: bool,

    /// Error text for failed actions.
    pub error: Option<String>,

    /// Free-form structured detail. Encrypted at rest by the store.
    pub details: serde_json::Value,

    /// Wall-clock duration of the action.
    pub execution_time_ms: Option<u64>,

    /// Heuristic risk score, 0–100.
    pub risk_score: Option<f64>,

    /// Flagged for human review.
    #[serde(default)]
    pub requires_review: bool,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create a successful event occurring now.
    #[must_use]
    pub fn success(
        event_type: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self::new(event_type, action, actor, true, None)
    }

    /// Create a failed event occurring now.
    #[must_use]
    pub fn failure(
        event_type: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(event_type, action, actor, false, Some(error.into()))
    }

    fn new(
        event_type: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
        success: bool,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            action: action.into(),
            actor: actor.into(),
            session_id: None,
            source_ip: None,
            user_agent: None,
            resource_type: None,
            resource_id: None,
            success,
            error,
            details: serde_json::Value::Null,
            execution_time_ms: None,
            risk_score: None,
            requires_review: false,
            occurred_at: Utc::now(),
        }
    }

    /// Attach the touched resource.
    #[must_use]
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Attach the action duration.
    #[must_use]
    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }
}

/// One authentication attempt against the token broker. Append-only; feeds
/// the lockout counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationAttempt {
    /// Unique record identifier.
    pub id: String,
    /// Identity the attempt was made for.
    pub identifier: String,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Failure reason when unsuccessful.
    pub reason: Option<String>,
    /// Source address, when known.
    pub source_ip: Option<String>,
    /// When the attempt occurred.
    pub occurred_at: DateTime<Utc>,
}

impl AuthenticationAttempt {
    /// Record an attempt occurring now.
    #[must_use]
    pub fn new(identifier: impl Into<String>, success: bool, reason: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identifier: identifier.into(),
            success,
            reason,
            source_ip: None,
            occurred_at: Utc::now(),
        }
    }
}

/// Severity of a security-relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecuritySeverity {
    Info,
    Warning,
    Critical,
}

impl SecuritySeverity {
    /// Stable string form used in persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// A security-relevant event (lockout, rate-limit trip, repeated auth
/// failure). Append-only; used for monitoring only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique record identifier.
    pub id: String,
    /// Event family, e.g. `lockout`, `rate_limit`.
    pub event_type: String,
    /// Severity level.
    pub severity: SecuritySeverity,
    /// Identity or key the event concerns.
    pub identifier: String,
    /// Human-readable description.
    pub description: String,
    /// Free-form structured detail.
    pub details: serde_json::Value,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    /// Record an event occurring now.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        severity: SecuritySeverity,
        identifier: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            severity,
            identifier: identifier.into(),
            description: description.into(),
            details: serde_json::Value::Null,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_event_has_no_error() {
        let event = AuditEvent::success("pipeline", "stage_transition", "scheduler")
            .with_resource("email", "m-1")
            .with_execution_time(12);
        assert!(event.success);
        assert!(event.error.is_none());
        assert_eq!(event.resource_id.as_deref(), Some("m-1"));
        assert_eq!(event.execution_time_ms, Some(12));
    }

    #[test]
    fn failure_event_carries_error() {
        let event = AuditEvent::failure("gateway", "send_reply", "pipeline", "timeout");
        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn severity_ordering() {
        assert!(SecuritySeverity::Critical > SecuritySeverity::Warning);
        assert!(SecuritySeverity::Warning > SecuritySeverity::Info);
    }
}
