use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five message categories the classifier may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailCategory {
    Purchasing,
    Support,
    Information,
    Escalation,
    Consultation,
}

impl EmailCategory {
    /// Parse the upper-case wire form. Returns `None` for anything outside
    /// the closed set so callers can apply their normalization default.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PURCHASING" => Some(Self::Purchasing),
            "SUPPORT" => Some(Self::Support),
            "INFORMATION" => Some(Self::Information),
            "ESCALATION" => Some(Self::Escalation),
            "CONSULTATION" => Some(Self::Consultation),
            _ => None,
        }
    }

    /// Stable string form used in persisted rows and group names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchasing => "PURCHASING",
            Self::Support => "SUPPORT",
            Self::Information => "INFORMATION",
            Self::Escalation => "ESCALATION",
            Self::Consultation => "CONSULTATION",
        }
    }
}

impl std::fmt::Display for EmailCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency assessment attached to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    /// Parse the upper-case wire form. `None` for unknown values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Whether the urgency preempts confidence-based auto handling.
    #[must_use]
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer verdict on a stored classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanFeedback {
    Correct,
    Incorrect,
    Partial,
}

impl HumanFeedback {
    /// Parse the lower-case wire form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "correct" => Some(Self::Correct),
            "incorrect" => Some(Self::Incorrect),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

/// Result of classifying one message. Stored exactly once per email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned category.
    pub category: EmailCategory,

    /// Confidence score, always within 0–100.
    pub confidence: f64,

    /// Model-provided explanation of the decision.
    pub reasoning: String,

    /// Urgency assessment.
    pub urgency: UrgencyLevel,

    /// Recommended next step, free form.
    pub suggested_action: String,

    /// Role tags whose expertise the message needs. May be empty.
    #[serde(default)]
    pub required_expertise: Vec<String>,

    /// Free-form effort estimate.
    pub estimated_effort: String,

    /// Model that produced this result.
    pub model: String,

    /// Version tag of the prompt that was used.
    pub prompt_version: String,

    /// Tokens consumed by the classification call, when reported.
    pub tokens_used: Option<u32>,

    /// Reviewer feedback, attached after the fact.
    pub human_feedback: Option<HumanFeedback>,

    /// Reviewer notes accompanying the feedback.
    pub feedback_notes: Option<String>,

    /// When the feedback was attached.
    pub feedback_at: Option<DateTime<Utc>>,
}

impl Classification {
    /// Fallback used when the LLM is unreachable or its output is unusable.
    /// Confidence 0 routes the message to immediate escalation.
    #[must_use]
    pub fn fallback(error_summary: &str) -> Self {
        Self {
            category: EmailCategory::Information,
            confidence: 0.0,
            reasoning: format!("error: {error_summary}"),
            urgency: UrgencyLevel::Medium,
            suggested_action: "Manual review required due to classification error".to_owned(),
            required_expertise: vec!["it_admin".to_owned()],
            estimated_effort: "Unknown".to_owned(),
            model: String::new(),
            prompt_version: String::new(),
            tokens_used: None,
            human_feedback: None,
            feedback_notes: None,
            feedback_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_closed_set() {
        assert_eq!(EmailCategory::parse("SUPPORT"), Some(EmailCategory::Support));
        assert_eq!(
            EmailCategory::parse("  purchasing "),
            Some(EmailCategory::Purchasing)
        );
        assert_eq!(EmailCategory::parse("SPAM"), None);
        assert_eq!(EmailCategory::parse(""), None);
    }

    #[test]
    fn urgency_ordering() {
        assert!(UrgencyLevel::Critical > UrgencyLevel::High);
        assert!(UrgencyLevel::High > UrgencyLevel::Medium);
        assert!(UrgencyLevel::Critical.is_elevated());
        assert!(UrgencyLevel::High.is_elevated());
        assert!(!UrgencyLevel::Medium.is_elevated());
    }

    #[test]
    fn fallback_routes_to_escalation() {
        let c = Classification::fallback("connection refused");
        assert_eq!(c.category, EmailCategory::Information);
        assert_eq!(c.confidence, 0.0);
        assert!(c.reasoning.contains("connection refused"));
        assert_eq!(c.required_expertise, vec!["it_admin".to_owned()]);
    }

    #[test]
    fn feedback_parse() {
        assert_eq!(HumanFeedback::parse("correct"), Some(HumanFeedback::Correct));
        assert_eq!(HumanFeedback::parse("PARTIAL"), Some(HumanFeedback::Partial));
        assert_eq!(HumanFeedback::parse("maybe"), None);
    }

    #[test]
    fn category_wire_form() {
        let json = serde_json::to_string(&EmailCategory::Escalation).unwrap();
        assert_eq!(json, "\"ESCALATION\"");
        let back: EmailCategory = serde_json::from_str("\"CONSULTATION\"").unwrap();
        assert_eq!(back, EmailCategory::Consultation);
    }
}
