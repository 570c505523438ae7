use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EmailId, GroupId};

/// Lifecycle state of an escalation group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Active,
    Resolved,
    Abandoned,
}

impl GroupStatus {
    /// Parse the persisted string form. `None` for unknown values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "resolved" => Some(Self::Resolved),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    /// Stable string form used in persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Escalation strategy produced by the planning prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPlan {
    /// Role tags to pull into the group.
    #[serde(default)]
    pub team_members: Vec<String>,

    /// Plan priority, free form ("low".."critical").
    pub priority: String,

    /// Free-form resolution time estimate.
    pub estimated_resolution_time: String,

    /// Immediate steps suggested to the responders.
    #[serde(default)]
    pub suggested_initial_actions: Vec<String>,

    /// Systems, documentation or tools the responders will need.
    #[serde(default)]
    pub resources_needed: Vec<String>,

    /// Why the escalation is needed.
    #[serde(default)]
    pub escalation_reason: String,
}

impl EscalationPlan {
    /// Default plan applied when the planning call fails.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            team_members: vec!["it_admin".to_owned()],
            priority: "medium".to_owned(),
            estimated_resolution_time: "1-2 hours".to_owned(),
            suggested_initial_actions: Vec::new(),
            resources_needed: Vec::new(),
            escalation_reason: "Standard escalation due to assessment error".to_owned(),
        }
    }
}

/// A chat group created for an email that needs human responders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationGroup {
    /// Chat-platform group identifier. Unique.
    pub group_id: GroupId,

    /// The email that triggered the escalation.
    pub email_id: EmailId,

    /// Display name, `EmailBot-<CATEGORY>-<timestamp>-<slug>`.
    pub name: String,

    /// Group description shown on the chat platform.
    pub description: String,

    /// Member addresses, in resolution order. Never empty.
    pub members: Vec<String>,

    /// Owner address.
    pub owner: String,

    /// Lifecycle state.
    pub status: GroupStatus,

    /// When the group was created.
    pub created_at: DateTime<Utc>,

    /// When the escalation was resolved. Set iff status is `Resolved`.
    pub resolved_at: Option<DateTime<Utc>>,

    /// Free-form resolution summary.
    pub resolution_notes: Option<String>,

    /// Hours between creation and resolution.
    pub resolution_time_hours: Option<f64>,

    /// Messages posted in the group, when tracked.
    #[serde(default)]
    pub message_count: u32,

    /// Minutes until the first responder message, when tracked.
    pub first_response_time_min: Option<f64>,

    /// Heuristic engagement score, when tracked.
    pub engagement_score: Option<f64>,
}

impl EscalationGroup {
    /// Create an active group record.
    #[must_use]
    pub fn new(
        group_id: impl Into<GroupId>,
        email_id: EmailId,
        name: impl Into<String>,
        description: impl Into<String>,
        members: Vec<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            email_id,
            name: name.into(),
            description: description.into(),
            members,
            owner: owner.into(),
            status: GroupStatus::Active,
            created_at: Utc::now(),
            resolved_at: None,
            resolution_notes: None,
            resolution_time_hours: None,
            message_count: 0,
            first_response_time_min: None,
            engagement_score: None,
        }
    }

    /// Number of members in the group.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_group_is_active() {
        let group = EscalationGroup::new(
            "g-1",
            EmailId::new("m-1"),
            "EmailBot-SUPPORT-20240601-1000-password-reset",
            "escalation",
            vec!["admin@example.com".to_owned()],
            "bot@example.com",
        );
        assert_eq!(group.status, GroupStatus::Active);
        assert_eq!(group.member_count(), 1);
        assert!(group.resolved_at.is_none());
    }

    #[test]
    fn fallback_plan_defaults() {
        let plan = EscalationPlan::fallback();
        assert_eq!(plan.team_members, vec!["it_admin".to_owned()]);
        assert_eq!(plan.priority, "medium");
        assert_eq!(plan.estimated_resolution_time, "1-2 hours");
    }

    #[test]
    fn plan_deserializes_with_missing_lists() {
        let plan: EscalationPlan = serde_json::from_str(
            r#"{"team_members": ["security"], "priority": "high",
                "estimated_resolution_time": "30 minutes"}"#,
        )
        .unwrap();
        assert!(plan.suggested_initial_actions.is_empty());
        assert!(plan.resources_needed.is_empty());
    }
}
