pub mod audit;
pub mod classification;
pub mod email;
pub mod error;
pub mod escalation;
pub mod metric;
pub mod pattern;
pub mod processing;
pub mod routing;
pub mod types;

pub use audit::{AuditEvent, AuthenticationAttempt, SecurityEvent, SecuritySeverity};
pub use classification::{Classification, EmailCategory, HumanFeedback, UrgencyLevel};
pub use email::{AttachmentMeta, EmailMessage, ProcessingStatus};
pub use error::TriageError;
pub use escalation::{EscalationGroup, EscalationPlan, GroupStatus};
pub use metric::PerformanceMetric;
pub use pattern::{EmailPattern, PatternKind, pattern_id};
pub use processing::{ProcessingRecord, RoutingAction, StageTimings};
pub use routing::{ConfidenceThresholds, route};
pub use types::{EmailId, GroupId};
