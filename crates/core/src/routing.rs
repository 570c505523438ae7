use serde::{Deserialize, Serialize};

use crate::classification::UrgencyLevel;
use crate::error::TriageError;
use crate::processing::RoutingAction;

/// Confidence thresholds driving the routing decision table.
///
/// Invariant: `0 <= review <= suggest <= auto <= 100`, and `auto` must sit in
/// `[70, 100]`. Enforced by [`ConfidenceThresholds::validate`], which
/// configuration loading calls before the pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// At or above this score, reply automatically.
    pub auto: f64,
    /// At or above this score, draft a reply for review.
    pub suggest: f64,
    /// At or above this score, flag for manual review.
    pub review: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            auto: 85.0,
            suggest: 60.0,
            review: 40.0,
        }
    }
}

impl ConfidenceThresholds {
    /// Check the threshold ordering and the allowed `auto` range.
    pub fn validate(&self) -> Result<(), TriageError> {
        if !(0.0..=100.0).contains(&self.review)
            || !(0.0..=100.0).contains(&self.suggest)
            || !(0.0..=100.0).contains(&self.auto)
        {
            return Err(TriageError::ConfigInvalid(
                "confidence thresholds must be within 0-100".to_owned(),
            ));
        }
        if self.review > self.suggest || self.suggest > self.auto {
            return Err(TriageError::ConfigInvalid(format!(
                "confidence thresholds must be ordered review <= suggest <= auto, \
                 got review={}, suggest={}, auto={}",
                self.review, self.suggest, self.auto
            )));
        }
        if !(70.0..=100.0).contains(&self.auto) {
            return Err(TriageError::ConfigInvalid(format!(
                "auto threshold must be within 70-100, got {}",
                self.auto
            )));
        }
        Ok(())
    }
}

/// Map a classification onto an action. First matching row wins:
///
/// 1. elevated urgency and confidence >= `suggest` — escalate
/// 2. confidence >= `auto` — reply automatically
/// 3. confidence >= `suggest` — draft only
/// 4. confidence >= `review` — manual review
/// 5. otherwise — escalate
///
/// Total over every `(confidence, urgency)` pair.
#[must_use]
pub fn route(
    confidence: f64,
    urgency: UrgencyLevel,
    thresholds: &ConfidenceThresholds,
) -> RoutingAction {
    if urgency.is_elevated() && confidence >= thresholds.suggest {
        return RoutingAction::Escalate;
    }
    if confidence >= thresholds.auto {
        return RoutingAction::AutoReply;
    }
    if confidence >= thresholds.suggest {
        return RoutingAction::Draft;
    }
    if confidence >= thresholds.review {
        return RoutingAction::ManualReview;
    }
    RoutingAction::Escalate
}

#[cfg(test)]
mod tests {
    use super::*;

    const URGENCIES: [UrgencyLevel; 4] = [
        UrgencyLevel::Low,
        UrgencyLevel::Medium,
        UrgencyLevel::High,
        UrgencyLevel::Critical,
    ];

    #[test]
    fn default_thresholds_are_valid() {
        ConfidenceThresholds::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_ordering() {
        let t = ConfidenceThresholds {
            auto: 80.0,
            suggest: 90.0,
            review: 40.0,
        };
        assert!(matches!(
            t.validate(),
            Err(TriageError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn rejects_auto_below_seventy() {
        let t = ConfidenceThresholds {
            auto: 65.0,
            suggest: 60.0,
            review: 40.0,
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range() {
        let t = ConfidenceThresholds {
            auto: 101.0,
            suggest: 60.0,
            review: 40.0,
        };
        assert!(t.validate().is_err());

        let t = ConfidenceThresholds {
            auto: 85.0,
            suggest: 60.0,
            review: -1.0,
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn high_confidence_auto_replies() {
        let t = ConfidenceThresholds::default();
        assert_eq!(
            route(92.0, UrgencyLevel::Medium, &t),
            RoutingAction::AutoReply
        );
        assert_eq!(route(85.0, UrgencyLevel::Low, &t), RoutingAction::AutoReply);
    }

    #[test]
    fn medium_confidence_drafts() {
        let t = ConfidenceThresholds::default();
        assert_eq!(route(70.0, UrgencyLevel::Low, &t), RoutingAction::Draft);
        assert_eq!(route(60.0, UrgencyLevel::Medium, &t), RoutingAction::Draft);
    }

    #[test]
    fn low_confidence_reviews() {
        let t = ConfidenceThresholds::default();
        assert_eq!(
            route(45.0, UrgencyLevel::Low, &t),
            RoutingAction::ManualReview
        );
    }

    #[test]
    fn very_low_confidence_escalates() {
        let t = ConfidenceThresholds::default();
        assert_eq!(route(10.0, UrgencyLevel::Low, &t), RoutingAction::Escalate);
        assert_eq!(route(0.0, UrgencyLevel::Medium, &t), RoutingAction::Escalate);
    }

    #[test]
    fn elevated_urgency_preempts_auto_reply() {
        let t = ConfidenceThresholds::default();
        assert_eq!(
            route(88.0, UrgencyLevel::Critical, &t),
            RoutingAction::Escalate
        );
        assert_eq!(route(95.0, UrgencyLevel::High, &t), RoutingAction::Escalate);
    }

    #[test]
    fn elevated_urgency_below_suggest_falls_through() {
        let t = ConfidenceThresholds::default();
        // Not confident enough for the urgency rule; row 4 applies.
        assert_eq!(
            route(45.0, UrgencyLevel::Critical, &t),
            RoutingAction::ManualReview
        );
    }

    #[test]
    fn router_is_total() {
        let t = ConfidenceThresholds::default();
        for urgency in URGENCIES {
            for tenth in 0..=1000 {
                let confidence = f64::from(tenth) / 10.0;
                // Must not panic, and every input maps to exactly one action.
                let _ = route(confidence, urgency, &t);
            }
        }
    }
}
