use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::EmailId;

/// The kind of recurring structure a pattern captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Subject,
    Sender,
    Content,
    Timing,
    Workflow,
}

impl PatternKind {
    /// Parse the persisted string form. `None` for unknown values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "subject" => Some(Self::Subject),
            "sender" => Some(Self::Sender),
            "content" => Some(Self::Content),
            "timing" => Some(Self::Timing),
            "workflow" => Some(Self::Workflow),
            _ => None,
        }
    }

    /// Stable string form used in persisted rows and pattern ids.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Sender => "sender",
            Self::Content => "content",
            Self::Timing => "timing",
            Self::Workflow => "workflow",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the stable pattern id for a kind + signature pair.
///
/// The id is the first 16 bytes of `SHA-256("{kind}:{signature}")` in hex,
/// so the same observed structure always maps to the same row.
#[must_use]
pub fn pattern_id(kind: PatternKind, signature: &str) -> String {
    let digest = Sha256::digest(format!("{kind}:{signature}").as_bytes());
    hex::encode(&digest[..16])
}

/// A recurring email structure with an automation-potential estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPattern {
    /// Stable identifier derived from the pattern signature.
    pub id: String,

    /// Pattern kind.
    pub kind: PatternKind,

    /// Human-readable description.
    pub description: String,

    /// Occurrences observed. Monotonically non-decreasing.
    pub frequency: u64,

    /// First observation.
    pub first_seen: DateTime<Utc>,

    /// Most recent observation. Always >= `first_seen`.
    pub last_seen: DateTime<Utc>,

    /// Automation feasibility score, 0–100.
    pub automation_potential: f64,

    /// Sample email ids exhibiting the pattern.
    #[serde(default)]
    pub sample_email_ids: Vec<EmailId>,

    /// Keywords shared across occurrences.
    #[serde(default)]
    pub common_keywords: Vec<String>,

    /// Estimated minutes saved per occurrence if automated.
    pub time_savings_minutes: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_id_is_stable() {
        let a = pattern_id(PatternKind::Sender, "example.com");
        let b = pattern_id(PatternKind::Sender, "example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn pattern_id_distinguishes_kinds() {
        let sender = pattern_id(PatternKind::Sender, "example.com");
        let subject = pattern_id(PatternKind::Subject, "example.com");
        assert_ne!(sender, subject);
    }
}
