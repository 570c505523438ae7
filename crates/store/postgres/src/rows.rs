//! Row types mapping database rows back to domain entities.
//!
//! Conversions take the field cipher because sensitive columns hold
//! `ENC[...]` envelopes that must be decrypted on the way out.

use chrono::{DateTime, Utc};

use triage_core::{
    AttachmentMeta, Classification, EmailCategory, EmailId, EmailMessage, EmailPattern,
    EscalationGroup, GroupId, GroupStatus, HumanFeedback, PatternKind, ProcessingRecord,
    ProcessingStatus, RoutingAction, StageTimings, UrgencyLevel,
};
use triage_crypto::FieldCipher;
use triage_store::StoreError;

fn decrypt(cipher: &FieldCipher, value: &str) -> Result<String, StoreError> {
    cipher
        .decrypt_to_string(value)
        .map_err(|e| StoreError::Encryption(e.to_string()))
}

fn json_strings(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(ToOwned::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EmailRow {
    id: String,
    sender_address: String,
    sender_name: Option<String>,
    recipient_address: String,
    subject: String,
    body: String,
    html_body: Option<String>,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    conversation_id: Option<String>,
    importance: Option<String>,
    attachments: serde_json::Value,
    status: String,
    retry_count: i32,
    last_error: Option<String>,
}

impl EmailRow {
    pub(crate) fn into_email(self, cipher: &FieldCipher) -> Result<EmailMessage, StoreError> {
        let status = ProcessingStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown status {}", self.status)))?;
        let attachments: Vec<AttachmentMeta> =
            serde_json::from_value(self.attachments).unwrap_or_default();

        Ok(EmailMessage {
            id: EmailId::new(self.id),
            sender_address: self.sender_address,
            sender_name: self.sender_name,
            recipient_address: self.recipient_address,
            subject: self.subject,
            body: decrypt(cipher, &self.body)?,
            html_body: self
                .html_body
                .as_deref()
                .map(|h| decrypt(cipher, h))
                .transpose()?,
            received_at: self.received_at,
            processed_at: self.processed_at,
            conversation_id: self.conversation_id,
            importance: self.importance,
            attachments,
            status,
            retry_count: self.retry_count as u32,
            last_error: self.last_error,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ClassificationRow {
    category: String,
    confidence: f64,
    reasoning: String,
    urgency: String,
    suggested_action: String,
    required_expertise: serde_json::Value,
    estimated_effort: String,
    model: String,
    prompt_version: String,
    tokens_used: Option<i32>,
    human_feedback: Option<String>,
    feedback_notes: Option<String>,
    feedback_at: Option<DateTime<Utc>>,
}

impl ClassificationRow {
    pub(crate) fn into_classification(
        self,
        cipher: &FieldCipher,
    ) -> Result<Classification, StoreError> {
        let category = EmailCategory::parse(&self.category).ok_or_else(|| {
            StoreError::Serialization(format!("unknown category {}", self.category))
        })?;
        let urgency = UrgencyLevel::parse(&self.urgency).ok_or_else(|| {
            StoreError::Serialization(format!("unknown urgency {}", self.urgency))
        })?;

        Ok(Classification {
            category,
            confidence: self.confidence,
            reasoning: decrypt(cipher, &self.reasoning)?,
            urgency,
            suggested_action: self.suggested_action,
            required_expertise: json_strings(self.required_expertise),
            estimated_effort: self.estimated_effort,
            model: self.model,
            prompt_version: self.prompt_version,
            tokens_used: self.tokens_used.map(|t| t as u32),
            human_feedback: self.human_feedback.as_deref().and_then(HumanFeedback::parse),
            feedback_notes: self.feedback_notes,
            feedback_at: self.feedback_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProcessingRow {
    id: String,
    email_id: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    action_taken: Option<String>,
    response_sent: bool,
    escalation_created: bool,
    escalation_ref: Option<String>,
    processing_ms: i64,
    classification_ms: i64,
    response_generation_ms: i64,
    error_message: Option<String>,
    error_stage: Option<String>,
    retry_count: i32,
    routing_decision: Option<String>,
}

impl ProcessingRow {
    pub(crate) fn into_record(self, cipher: &FieldCipher) -> Result<ProcessingRecord, StoreError> {
        let status = ProcessingStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown status {}", self.status)))?;

        Ok(ProcessingRecord {
            id: self.id,
            email_id: EmailId::new(self.email_id),
            status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            action_taken: self
                .action_taken
                .as_deref()
                .map(|a| decrypt(cipher, a))
                .transpose()?,
            response_sent: self.response_sent,
            escalation_created: self.escalation_created,
            escalation_ref: self.escalation_ref,
            timings: StageTimings {
                processing_ms: self.processing_ms as u64,
                classification_ms: self.classification_ms as u64,
                response_generation_ms: self.response_generation_ms as u64,
            },
            error_message: self.error_message,
            error_stage: self.error_stage,
            retry_count: self.retry_count as u32,
            routing_decision: self.routing_decision.as_deref().and_then(RoutingAction::parse),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EscalationRow {
    group_id: String,
    email_id: String,
    name: String,
    description: String,
    members: serde_json::Value,
    owner: String,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolution_notes: Option<String>,
    resolution_time_hours: Option<f64>,
    message_count: i32,
    first_response_time_min: Option<f64>,
    engagement_score: Option<f64>,
}

impl EscalationRow {
    pub(crate) fn into_group(self, cipher: &FieldCipher) -> Result<EscalationGroup, StoreError> {
        let status = GroupStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Serialization(format!("unknown group status {}", self.status))
        })?;

        Ok(EscalationGroup {
            group_id: GroupId::new(self.group_id),
            email_id: EmailId::new(self.email_id),
            name: self.name,
            description: self.description,
            members: json_strings(self.members),
            owner: self.owner,
            status,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            resolution_notes: self
                .resolution_notes
                .as_deref()
                .map(|n| decrypt(cipher, n))
                .transpose()?,
            resolution_time_hours: self.resolution_time_hours,
            message_count: self.message_count as u32,
            first_response_time_min: self.first_response_time_min,
            engagement_score: self.engagement_score,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PatternRow {
    id: String,
    kind: String,
    description: String,
    frequency: i64,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    automation_potential: f64,
    sample_email_ids: serde_json::Value,
    common_keywords: serde_json::Value,
    time_savings_minutes: Option<f64>,
}

impl PatternRow {
    pub(crate) fn into_pattern(self) -> Result<EmailPattern, StoreError> {
        let kind = PatternKind::parse(&self.kind).ok_or_else(|| {
            StoreError::Serialization(format!("unknown pattern kind {}", self.kind))
        })?;

        Ok(EmailPattern {
            id: self.id,
            kind,
            description: self.description,
            frequency: self.frequency as u64,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            automation_potential: self.automation_potential,
            sample_email_ids: json_strings(self.sample_email_ids)
                .into_iter()
                .map(EmailId::new)
                .collect(),
            common_keywords: json_strings(self.common_keywords),
            time_savings_minutes: self.time_savings_minutes,
        })
    }
}
