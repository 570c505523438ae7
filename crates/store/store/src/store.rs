use async_trait::async_trait;
use chrono::{DateTime, Utc};

use triage_core::{
    AuditEvent, AuthenticationAttempt, Classification, EmailId, EmailMessage, EmailPattern,
    EscalationGroup, GroupId, HumanFeedback, PatternKind, PerformanceMetric, ProcessingRecord,
    ProcessingStatus, RoutingAction, SecurityEvent, StageTimings,
};

use crate::error::StoreError;
use crate::statistics::{
    ClassificationStatistics, DashboardSnapshot, MetricsSummary, ProcessingStatistics,
};

/// Terminal outcome of a processing attempt.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    /// The routing decision that was applied.
    pub action: RoutingAction,
    /// Human-readable description; carries draft text for `Draft` outcomes.
    pub action_taken: String,
    /// Whether a reply was sent.
    pub response_sent: bool,
    /// Group id of the escalation, when one was created.
    pub escalation_ref: Option<GroupId>,
    /// Stage timings for the attempt.
    pub timings: StageTimings,
    /// Retry attempts consumed.
    pub retry_count: u32,
}

/// One observation of a recurring email structure, fed into
/// [`TriageStore::upsert_pattern`].
#[derive(Debug, Clone)]
pub struct PatternObservation {
    /// Pattern kind.
    pub kind: PatternKind,
    /// Stable signature the pattern id is derived from.
    pub signature: String,
    /// Human-readable description.
    pub description: String,
    /// Automation feasibility score for this observation, 0–100.
    pub automation_potential: f64,
    /// The email exhibiting the pattern.
    pub email_id: EmailId,
    /// Keywords extracted from the occurrence.
    pub keywords: Vec<String>,
    /// Estimated minutes saved per occurrence if automated.
    pub time_savings_minutes: Option<f64>,
}

/// Trait for the durable store.
///
/// The store exclusively owns entity lifetimes; callers hold ids. Each
/// operation is a single transaction — no operation spans outbound I/O.
/// All timestamps are stored in UTC. Sensitive fields (bodies, reasoning,
/// audit details, resolution notes) are encrypted at rest by durable
/// backends.
#[async_trait]
pub trait TriageStore: Send + Sync {
    // -- Emails --

    /// Persist a newly observed email. Idempotent: when a row with the same
    /// id already exists the call is a no-op returning `false`; a fresh
    /// insert returns `true`.
    async fn put_email(&self, email: &EmailMessage) -> Result<bool, StoreError>;

    /// Fetch one email by id.
    async fn get_email(&self, id: &EmailId) -> Result<Option<EmailMessage>, StoreError>;

    /// Move an email to a new pipeline status. Sets `processed_at` when the
    /// status is terminal.
    async fn update_email_status(
        &self,
        id: &EmailId,
        status: ProcessingStatus,
    ) -> Result<(), StoreError>;

    /// Record a retry and the error that caused it.
    async fn record_email_error(
        &self,
        id: &EmailId,
        retry_count: u32,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Emails not yet in a terminal state, oldest first.
    async fn unprocessed_emails(&self, limit: u32) -> Result<Vec<EmailMessage>, StoreError>;

    /// Emails from one sender, newest first.
    async fn emails_by_sender(
        &self,
        sender: &str,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, StoreError>;

    /// Emails received inside a time range, oldest first.
    async fn emails_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, StoreError>;

    // -- Classifications --

    /// Store the classification for an email. Exactly one per email;
    /// a second write returns [`StoreError::Conflict`].
    async fn put_classification(
        &self,
        email_id: &EmailId,
        classification: &Classification,
    ) -> Result<(), StoreError>;

    /// Fetch the classification for an email.
    async fn get_classification(
        &self,
        email_id: &EmailId,
    ) -> Result<Option<Classification>, StoreError>;

    /// Attach reviewer feedback to a stored classification.
    async fn add_human_feedback(
        &self,
        email_id: &EmailId,
        feedback: HumanFeedback,
        notes: Option<&str>,
    ) -> Result<(), StoreError>;

    // -- Processing attempts --

    /// Open a processing attempt for an email and return the record.
    async fn begin_processing(&self, email_id: &EmailId)
    -> Result<ProcessingRecord, StoreError>;

    /// The most recent processing attempt for an email.
    async fn get_processing(
        &self,
        email_id: &EmailId,
    ) -> Result<Option<ProcessingRecord>, StoreError>;

    /// Close the open attempt as completed.
    async fn complete_processing(
        &self,
        email_id: &EmailId,
        outcome: &ProcessingOutcome,
    ) -> Result<(), StoreError>;

    /// Close the open attempt as failed, recording the failing stage.
    async fn fail_processing(
        &self,
        email_id: &EmailId,
        error: &str,
        stage: &str,
    ) -> Result<(), StoreError>;

    // -- Escalations --

    /// Persist an escalation group. Group ids are unique; a duplicate
    /// returns [`StoreError::Conflict`].
    async fn put_escalation(&self, group: &EscalationGroup) -> Result<(), StoreError>;

    /// Resolve a group: set status, notes, `resolved_at` and compute
    /// `resolution_time_hours`. Returns the updated group.
    async fn resolve_escalation(
        &self,
        group_id: &GroupId,
        notes: &str,
    ) -> Result<EscalationGroup, StoreError>;

    /// Groups currently active, newest first.
    async fn active_escalations(&self) -> Result<Vec<EscalationGroup>, StoreError>;

    // -- Patterns --

    /// Record one observation of a pattern. Inserts with frequency 1 on
    /// first sight; afterwards increments frequency, refreshes `last_seen`
    /// and the automation potential, and appends the sample id. Returns the
    /// stored pattern.
    async fn upsert_pattern(
        &self,
        observation: &PatternObservation,
    ) -> Result<EmailPattern, StoreError>;

    /// Patterns meeting the automation bar, highest frequency first.
    async fn automation_candidates(
        &self,
        min_frequency: u64,
        min_potential: f64,
    ) -> Result<Vec<EmailPattern>, StoreError>;

    // -- Metrics --

    /// Append one performance measurement.
    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<(), StoreError>;

    /// Aggregate metrics over a trailing window, optionally filtered by kind.
    async fn metrics_summary(
        &self,
        kind: Option<&str>,
        days: u32,
    ) -> Result<MetricsSummary, StoreError>;

    // -- Audit & security --

    /// Append one audit event. Audit rows are never mutated.
    async fn put_audit(&self, event: &AuditEvent) -> Result<(), StoreError>;

    /// Append one authentication attempt.
    async fn record_auth_attempt(
        &self,
        attempt: &AuthenticationAttempt,
    ) -> Result<(), StoreError>;

    /// Append one security event.
    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError>;

    // -- Statistics --

    /// Rolled-up processing outcomes over a trailing window.
    async fn processing_statistics(&self, days: u32)
    -> Result<ProcessingStatistics, StoreError>;

    /// Rolled-up classification quality numbers.
    async fn classification_statistics(&self) -> Result<ClassificationStatistics, StoreError>;

    /// Point-in-time dashboard counters.
    async fn dashboard_snapshot(&self) -> Result<DashboardSnapshot, StoreError>;
}
