use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};

use triage_core::{
    AuditEvent, AuthenticationAttempt, Classification, EmailId, EmailMessage, EmailPattern,
    EscalationGroup, GroupId, HumanFeedback, PerformanceMetric, ProcessingRecord,
    ProcessingStatus, SecurityEvent, pattern_id,
};
use triage_crypto::FieldCipher;
use triage_store::{
    CategoryCount, ClassificationStatistics, DashboardSnapshot, MetricAggregate, MetricsSummary,
    PatternObservation, ProcessingOutcome, ProcessingStatistics, StoreError, TriageStore,
};

use crate::config::PostgresStoreConfig;
use crate::migrations;
use crate::rows::{ClassificationRow, EmailRow, EscalationRow, PatternRow, ProcessingRow};

/// Postgres-backed [`TriageStore`] using `sqlx`.
///
/// Sensitive fields are encrypted before they reach the pool and decrypted
/// on the way out; the database only ever sees `ENC[...]` envelopes for
/// bodies, reasoning, draft text, resolution notes and audit details.
pub struct PostgresTriageStore {
    pool: PgPool,
    cipher: FieldCipher,
    prefix: String,
}

fn sql_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Connection(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn strings_json(values: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        values
            .iter()
            .map(|s| serde_json::Value::String(s.clone()))
            .collect(),
    )
}

impl PostgresTriageStore {
    /// Connect to Postgres, run migrations, and return the store.
    pub async fn new(config: &PostgresStoreConfig, cipher: FieldCipher) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::from_pool(pool, &config.prefix, cipher).await
    }

    /// Create from an existing pool (useful for testing). Runs migrations.
    pub async fn from_pool(
        pool: PgPool,
        prefix: &str,
        cipher: FieldCipher,
    ) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, prefix)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            pool,
            cipher,
            prefix: prefix.to_owned(),
        })
    }

    fn table(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    fn encrypt(&self, value: &str) -> Result<String, StoreError> {
        self.cipher
            .encrypt(value)
            .map_err(|e| StoreError::Encryption(e.to_string()))
    }

    fn encrypt_opt(&self, value: Option<&str>) -> Result<Option<String>, StoreError> {
        value.map(|v| self.encrypt(v)).transpose()
    }
}

#[async_trait]
impl TriageStore for PostgresTriageStore {
    async fn put_email(&self, email: &EmailMessage) -> Result<bool, StoreError> {
        let sql = format!(
            r"
            INSERT INTO {} (
                id, sender_address, sender_name, recipient_address, subject,
                body, html_body, received_at, processed_at, conversation_id,
                importance, attachments, status, retry_count, last_error
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15
            )
            ON CONFLICT (id) DO NOTHING
            ",
            self.table("emails")
        );

        let attachments = serde_json::to_value(&email.attachments)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(&sql)
            .bind(email.id.as_str())
            .bind(&email.sender_address)
            .bind(&email.sender_name)
            .bind(&email.recipient_address)
            .bind(&email.subject)
            .bind(self.encrypt(&email.body)?)
            .bind(self.encrypt_opt(email.html_body.as_deref())?)
            .bind(email.received_at)
            .bind(email.processed_at)
            .bind(&email.conversation_id)
            .bind(&email.importance)
            .bind(attachments)
            .bind(email.status.as_str())
            .bind(i32::try_from(email.retry_count).unwrap_or(i32::MAX))
            .bind(&email.last_error)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_email(&self, id: &EmailId) -> Result<Option<EmailMessage>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", self.table("emails"));
        let row = sqlx::query_as::<_, EmailRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.map(|r| r.into_email(&self.cipher)).transpose()
    }

    async fn update_email_status(
        &self,
        id: &EmailId,
        status: ProcessingStatus,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET status = $2, processed_at = $3 WHERE id = $1",
            self.table("emails")
        );
        let processed_at = status.is_terminal().then(Utc::now);
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(status.as_str())
            .bind(processed_at)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("email {id}")));
        }
        Ok(())
    }

    async fn record_email_error(
        &self,
        id: &EmailId,
        retry_count: u32,
        error: &str,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET retry_count = $2, last_error = $3 WHERE id = $1",
            self.table("emails")
        );
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(i32::try_from(retry_count).unwrap_or(i32::MAX))
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("email {id}")));
        }
        Ok(())
    }

    async fn unprocessed_emails(&self, limit: u32) -> Result<Vec<EmailMessage>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE status NOT IN ('completed', 'failed')
             ORDER BY received_at ASC LIMIT $1",
            self.table("emails")
        );
        let rows = sqlx::query_as::<_, EmailRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        rows.into_iter()
            .map(|r| r.into_email(&self.cipher))
            .collect()
    }

    async fn emails_by_sender(
        &self,
        sender: &str,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE LOWER(sender_address) = LOWER($1)
             ORDER BY received_at DESC LIMIT $2",
            self.table("emails")
        );
        let rows = sqlx::query_as::<_, EmailRow>(&sql)
            .bind(sender)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        rows.into_iter()
            .map(|r| r.into_email(&self.cipher))
            .collect()
    }

    async fn emails_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE received_at >= $1 AND received_at <= $2
             ORDER BY received_at ASC LIMIT $3",
            self.table("emails")
        );
        let rows = sqlx::query_as::<_, EmailRow>(&sql)
            .bind(from)
            .bind(to)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        rows.into_iter()
            .map(|r| r.into_email(&self.cipher))
            .collect()
    }

    async fn put_classification(
        &self,
        email_id: &EmailId,
        classification: &Classification,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r"
            INSERT INTO {} (
                email_id, category, confidence, reasoning, urgency,
                suggested_action, required_expertise, estimated_effort,
                model, prompt_version, tokens_used,
                human_feedback, feedback_notes, feedback_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8,
                $9, $10, $11,
                $12, $13, $14
            )
            ",
            self.table("classifications")
        );

        let feedback = classification.human_feedback.map(|f| match f {
            HumanFeedback::Correct => "correct",
            HumanFeedback::Incorrect => "incorrect",
            HumanFeedback::Partial => "partial",
        });

        sqlx::query(&sql)
            .bind(email_id.as_str())
            .bind(classification.category.as_str())
            .bind(classification.confidence)
            .bind(self.encrypt(&classification.reasoning)?)
            .bind(classification.urgency.as_str())
            .bind(&classification.suggested_action)
            .bind(strings_json(&classification.required_expertise))
            .bind(&classification.estimated_effort)
            .bind(&classification.model)
            .bind(&classification.prompt_version)
            .bind(classification.tokens_used.map(|t| i32::try_from(t).unwrap_or(i32::MAX)))
            .bind(feedback)
            .bind(&classification.feedback_notes)
            .bind(classification.feedback_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!(
                        "classification already stored for email {email_id}"
                    ))
                } else {
                    sql_err(e)
                }
            })?;

        Ok(())
    }

    async fn get_classification(
        &self,
        email_id: &EmailId,
    ) -> Result<Option<Classification>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE email_id = $1",
            self.table("classifications")
        );
        let row = sqlx::query_as::<_, ClassificationRow>(&sql)
            .bind(email_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.map(|r| r.into_classification(&self.cipher)).transpose()
    }

    async fn add_human_feedback(
        &self,
        email_id: &EmailId,
        feedback: HumanFeedback,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET human_feedback = $2, feedback_notes = $3, feedback_at = $4
             WHERE email_id = $1",
            self.table("classifications")
        );
        let feedback_str = match feedback {
            HumanFeedback::Correct => "correct",
            HumanFeedback::Incorrect => "incorrect",
            HumanFeedback::Partial => "partial",
        };
        let result = sqlx::query(&sql)
            .bind(email_id.as_str())
            .bind(feedback_str)
            .bind(notes)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "classification for {email_id}"
            )));
        }
        Ok(())
    }

    async fn begin_processing(
        &self,
        email_id: &EmailId,
    ) -> Result<ProcessingRecord, StoreError> {
        let record = ProcessingRecord::begin(email_id.clone());
        let sql = format!(
            "INSERT INTO {} (id, email_id, status, started_at) VALUES ($1, $2, $3, $4)",
            self.table("processing_results")
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(email_id.as_str())
            .bind(record.status.as_str())
            .bind(record.started_at)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(record)
    }

    async fn get_processing(
        &self,
        email_id: &EmailId,
    ) -> Result<Option<ProcessingRecord>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE email_id = $1 ORDER BY started_at DESC LIMIT 1",
            self.table("processing_results")
        );
        let row = sqlx::query_as::<_, ProcessingRow>(&sql)
            .bind(email_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        row.map(|r| r.into_record(&self.cipher)).transpose()
    }

    async fn complete_processing(
        &self,
        email_id: &EmailId,
        outcome: &ProcessingOutcome,
    ) -> Result<(), StoreError> {
        let table = self.table("processing_results");
        let sql = format!(
            r"
            UPDATE {table} SET
                status = 'completed',
                completed_at = $2,
                action_taken = $3,
                response_sent = $4,
                escalation_created = $5,
                escalation_ref = $6,
                processing_ms = $7,
                classification_ms = $8,
                response_generation_ms = $9,
                retry_count = $10,
                routing_decision = $11
            WHERE id = (
                SELECT id FROM {table} WHERE email_id = $1
                ORDER BY started_at DESC LIMIT 1
            )
            "
        );

        #[allow(clippy::cast_possible_wrap)]
        let result = sqlx::query(&sql)
            .bind(email_id.as_str())
            .bind(Utc::now())
            .bind(self.encrypt(&outcome.action_taken)?)
            .bind(outcome.response_sent)
            .bind(outcome.escalation_ref.is_some())
            .bind(outcome.escalation_ref.as_ref().map(|g| g.as_str().to_owned()))
            .bind(outcome.timings.processing_ms as i64)
            .bind(outcome.timings.classification_ms as i64)
            .bind(outcome.timings.response_generation_ms as i64)
            .bind(i32::try_from(outcome.retry_count).unwrap_or(i32::MAX))
            .bind(outcome.action.as_str())
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("processing for {email_id}")));
        }
        Ok(())
    }

    async fn fail_processing(
        &self,
        email_id: &EmailId,
        error: &str,
        stage: &str,
    ) -> Result<(), StoreError> {
        let table = self.table("processing_results");
        let sql = format!(
            r"
            UPDATE {table} SET
                status = 'failed',
                completed_at = $2,
                error_message = $3,
                error_stage = $4
            WHERE id = (
                SELECT id FROM {table} WHERE email_id = $1
                ORDER BY started_at DESC LIMIT 1
            )
            "
        );
        let result = sqlx::query(&sql)
            .bind(email_id.as_str())
            .bind(Utc::now())
            .bind(error)
            .bind(stage)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("processing for {email_id}")));
        }
        Ok(())
    }

    async fn put_escalation(&self, group: &EscalationGroup) -> Result<(), StoreError> {
        let sql = format!(
            r"
            INSERT INTO {} (
                group_id, email_id, name, description, members, owner,
                status, created_at, resolved_at, resolution_notes,
                resolution_time_hours, message_count, first_response_time_min,
                engagement_score
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10,
                $11, $12, $13,
                $14
            )
            ",
            self.table("escalation_groups")
        );

        sqlx::query(&sql)
            .bind(group.group_id.as_str())
            .bind(group.email_id.as_str())
            .bind(&group.name)
            .bind(&group.description)
            .bind(strings_json(&group.members))
            .bind(&group.owner)
            .bind(group.status.as_str())
            .bind(group.created_at)
            .bind(group.resolved_at)
            .bind(self.encrypt_opt(group.resolution_notes.as_deref())?)
            .bind(group.resolution_time_hours)
            .bind(i32::try_from(group.message_count).unwrap_or(i32::MAX))
            .bind(group.first_response_time_min)
            .bind(group.engagement_score)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!(
                        "escalation group {} already stored",
                        group.group_id
                    ))
                } else {
                    sql_err(e)
                }
            })?;

        Ok(())
    }

    async fn resolve_escalation(
        &self,
        group_id: &GroupId,
        notes: &str,
    ) -> Result<EscalationGroup, StoreError> {
        let table = self.table("escalation_groups");
        let sql = format!(
            r"
            UPDATE {table} SET
                status = 'resolved',
                resolved_at = $2,
                resolution_notes = $3,
                resolution_time_hours = EXTRACT(EPOCH FROM ($2::timestamptz - created_at)) / 3600.0
            WHERE group_id = $1 AND status = 'active'
            RETURNING *
            "
        );

        let row = sqlx::query_as::<_, EscalationRow>(&sql)
            .bind(group_id.as_str())
            .bind(Utc::now())
            .bind(self.encrypt(notes)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;

        match row {
            Some(row) => row.into_group(&self.cipher),
            None => {
                // Distinguish an unknown group from one already resolved.
                let exists_sql =
                    format!("SELECT status FROM {table} WHERE group_id = $1");
                let status: Option<String> = sqlx::query_scalar(&exists_sql)
                    .bind(group_id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(sql_err)?;
                match status {
                    Some(_) => Err(StoreError::Conflict(format!(
                        "escalation group {group_id} is not active"
                    ))),
                    None => Err(StoreError::NotFound(format!(
                        "escalation group {group_id}"
                    ))),
                }
            }
        }
    }

    async fn active_escalations(&self) -> Result<Vec<EscalationGroup>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE status = 'active' ORDER BY created_at DESC",
            self.table("escalation_groups")
        );
        let rows = sqlx::query_as::<_, EscalationRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        rows.into_iter()
            .map(|r| r.into_group(&self.cipher))
            .collect()
    }

    async fn upsert_pattern(
        &self,
        observation: &PatternObservation,
    ) -> Result<EmailPattern, StoreError> {
        let table = self.table("email_patterns");
        let sql = format!(
            r"
            INSERT INTO {table} (
                id, kind, description, frequency, first_seen, last_seen,
                automation_potential, sample_email_ids, common_keywords,
                time_savings_minutes
            ) VALUES ($1, $2, $3, 1, $4, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                frequency = {table}.frequency + 1,
                last_seen = EXCLUDED.last_seen,
                automation_potential = EXCLUDED.automation_potential,
                sample_email_ids = CASE
                    WHEN {table}.sample_email_ids @> EXCLUDED.sample_email_ids
                    THEN {table}.sample_email_ids
                    ELSE {table}.sample_email_ids || EXCLUDED.sample_email_ids
                END,
                common_keywords = CASE
                    WHEN {table}.common_keywords @> EXCLUDED.common_keywords
                    THEN {table}.common_keywords
                    ELSE {table}.common_keywords || EXCLUDED.common_keywords
                END
            RETURNING *
            "
        );

        let id = pattern_id(observation.kind, &observation.signature);
        let samples = strings_json(&[observation.email_id.as_str().to_owned()]);

        let row = sqlx::query_as::<_, PatternRow>(&sql)
            .bind(&id)
            .bind(observation.kind.as_str())
            .bind(&observation.description)
            .bind(Utc::now())
            .bind(observation.automation_potential)
            .bind(samples)
            .bind(strings_json(&observation.keywords))
            .bind(observation.time_savings_minutes)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err)?;

        row.into_pattern()
    }

    async fn automation_candidates(
        &self,
        min_frequency: u64,
        min_potential: f64,
    ) -> Result<Vec<EmailPattern>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE frequency >= $1 AND automation_potential >= $2
             ORDER BY frequency DESC",
            self.table("email_patterns")
        );
        let rows = sqlx::query_as::<_, PatternRow>(&sql)
            .bind(i64::try_from(min_frequency).unwrap_or(i64::MAX))
            .bind(min_potential)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;
        rows.into_iter().map(PatternRow::into_pattern).collect()
    }

    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<(), StoreError> {
        let sql = format!(
            r"
            INSERT INTO {} (
                kind, name, category, value, unit, email_id,
                agg_window, aggregation, tags, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
            self.table("performance_metrics")
        );
        let tags = serde_json::to_value(&metric.tags)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query(&sql)
            .bind(&metric.kind)
            .bind(&metric.name)
            .bind(&metric.category)
            .bind(metric.value)
            .bind(&metric.unit)
            .bind(metric.email_id.as_ref().map(|i| i.as_str().to_owned()))
            .bind(&metric.window)
            .bind(&metric.aggregation)
            .bind(tags)
            .bind(metric.recorded_at)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    async fn metrics_summary(
        &self,
        kind: Option<&str>,
        days: u32,
    ) -> Result<MetricsSummary, StoreError> {
        let table = self.table("performance_metrics");
        let cutoff = Utc::now() - Duration::days(i64::from(days));

        let (filter, has_kind) = match kind {
            Some(_) => ("AND kind = $2", true),
            None => ("", false),
        };
        let sql = format!(
            r"
            SELECT kind, name, COUNT(*) AS count,
                   AVG(value) AS avg, MIN(value) AS min, MAX(value) AS max
            FROM {table}
            WHERE recorded_at >= $1 {filter}
            GROUP BY kind, name
            ORDER BY kind, name
            "
        );

        let mut query = sqlx::query(&sql).bind(cutoff);
        if has_kind {
            query = query.bind(kind.unwrap());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(sql_err)?;

        let series = rows
            .into_iter()
            .map(|row| {
                let count: i64 = row.try_get("count").unwrap_or(0);
                MetricAggregate {
                    kind: row.try_get("kind").unwrap_or_default(),
                    name: row.try_get("name").unwrap_or_default(),
                    count: count as u64,
                    avg: row.try_get("avg").unwrap_or(0.0),
                    min: row.try_get("min").unwrap_or(0.0),
                    max: row.try_get("max").unwrap_or(0.0),
                }
            })
            .collect();

        Ok(MetricsSummary {
            window_days: days,
            kind: kind.map(ToOwned::to_owned),
            series,
        })
    }

    async fn put_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let sql = format!(
            r"
            INSERT INTO {} (
                id, event_type, action, actor, session_id, source_ip,
                user_agent, resource_type, resource_id, success, error,
                details, execution_time_ms, risk_score, requires_review,
                occurred_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11,
                $12, $13, $14, $15,
                $16
            )
            ",
            self.table("audit_events")
        );

        let details = serde_json::to_string(&event.details)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        #[allow(clippy::cast_possible_wrap)]
        sqlx::query(&sql)
            .bind(&event.id)
            .bind(&event.event_type)
            .bind(&event.action)
            .bind(&event.actor)
            .bind(&event.session_id)
            .bind(&event.source_ip)
            .bind(&event.user_agent)
            .bind(&event.resource_type)
            .bind(&event.resource_id)
            .bind(event.success)
            .bind(&event.error)
            .bind(self.encrypt(&details)?)
            .bind(event.execution_time_ms.map(|t| t as i64))
            .bind(event.risk_score)
            .bind(event.requires_review)
            .bind(event.occurred_at)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    async fn record_auth_attempt(
        &self,
        attempt: &AuthenticationAttempt,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, identifier, success, reason, source_ip, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.table("auth_attempts")
        );
        sqlx::query(&sql)
            .bind(&attempt.id)
            .bind(&attempt.identifier)
            .bind(attempt.success)
            .bind(&attempt.reason)
            .bind(&attempt.source_ip)
            .bind(attempt.occurred_at)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, event_type, severity, identifier, description, details, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table("security_events")
        );
        sqlx::query(&sql)
            .bind(&event.id)
            .bind(&event.event_type)
            .bind(event.severity.as_str())
            .bind(&event.identifier)
            .bind(&event.description)
            .bind(&event.details)
            .bind(event.occurred_at)
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    async fn processing_statistics(
        &self,
        days: u32,
    ) -> Result<ProcessingStatistics, StoreError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let sql = format!(
            r"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (
                    WHERE status = 'completed' AND routing_decision = 'auto_reply'
                      AND response_sent
                ) AS auto_replies,
                COUNT(*) FILTER (
                    WHERE status = 'completed' AND routing_decision = 'draft'
                ) AS drafts,
                COUNT(*) FILTER (
                    WHERE status = 'completed' AND routing_decision = 'escalate'
                      AND escalation_created
                ) AS escalations,
                COALESCE(AVG(processing_ms) FILTER (WHERE status = 'completed'), 0)::float8
                    AS avg_ms
            FROM {}
            WHERE started_at >= $1
            ",
            self.table("processing_results")
        );

        let row = sqlx::query(&sql)
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err)?;

        let total: i64 = row.try_get("total").unwrap_or(0);
        let completed: i64 = row.try_get("completed").unwrap_or(0);
        let failed: i64 = row.try_get("failed").unwrap_or(0);
        let auto_replies: i64 = row.try_get("auto_replies").unwrap_or(0);
        let drafts: i64 = row.try_get("drafts").unwrap_or(0);
        let escalations: i64 = row.try_get("escalations").unwrap_or(0);
        let avg_ms: f64 = row.try_get("avg_ms").unwrap_or(0.0);

        Ok(ProcessingStatistics {
            window_days: days,
            total: total as u64,
            completed: completed as u64,
            failed: failed as u64,
            auto_replies_sent: auto_replies as u64,
            drafts_created: drafts as u64,
            escalations_created: escalations as u64,
            manual_reviews: (completed - auto_replies - drafts - escalations).max(0) as u64,
            avg_processing_ms: avg_ms,
        })
    }

    async fn classification_statistics(&self) -> Result<ClassificationStatistics, StoreError> {
        let table = self.table("classifications");

        let totals_sql = format!(
            r"
            SELECT
                COUNT(*) AS total,
                COALESCE(AVG(confidence), 0) AS avg_confidence,
                COUNT(*) FILTER (WHERE human_feedback = 'correct') AS correct,
                COUNT(*) FILTER (WHERE human_feedback = 'incorrect') AS incorrect,
                COUNT(*) FILTER (WHERE human_feedback = 'partial') AS partial
            FROM {table}
            "
        );
        let row = sqlx::query(&totals_sql)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err)?;

        let total: i64 = row.try_get("total").unwrap_or(0);
        let avg_confidence: f64 = row.try_get("avg_confidence").unwrap_or(0.0);
        let correct: i64 = row.try_get("correct").unwrap_or(0);
        let incorrect: i64 = row.try_get("incorrect").unwrap_or(0);
        let partial: i64 = row.try_get("partial").unwrap_or(0);

        let by_category_sql = format!(
            "SELECT category, COUNT(*) AS count, AVG(confidence) AS avg_confidence
             FROM {table} GROUP BY category ORDER BY category"
        );
        let category_rows = sqlx::query(&by_category_sql)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;

        let by_category = category_rows
            .into_iter()
            .map(|row| {
                let count: i64 = row.try_get("count").unwrap_or(0);
                CategoryCount {
                    category: row.try_get("category").unwrap_or_default(),
                    count: count as u64,
                    avg_confidence: row.try_get("avg_confidence").unwrap_or(0.0),
                }
            })
            .collect();

        Ok(ClassificationStatistics {
            total: total as u64,
            by_category,
            avg_confidence,
            feedback_correct: correct as u64,
            feedback_incorrect: incorrect as u64,
            feedback_partial: partial as u64,
        })
    }

    async fn dashboard_snapshot(&self) -> Result<DashboardSnapshot, StoreError> {
        let emails = self.table("emails");
        let escalations = self.table("escalation_groups");
        let classifications = self.table("classifications");
        let patterns = self.table("email_patterns");

        let counts_sql = format!(
            r"
            SELECT
                (SELECT COUNT(*) FROM {emails}) AS total_emails,
                (SELECT COUNT(*) FROM {emails}
                 WHERE received_at >= NOW() - INTERVAL '24 hours') AS last_24h,
                (SELECT COUNT(*) FROM {emails}
                 WHERE status NOT IN ('completed', 'failed')) AS unprocessed,
                (SELECT COUNT(*) FROM {escalations} WHERE status = 'active')
                    AS active_escalations,
                (SELECT COUNT(*) FROM {patterns}
                 WHERE frequency >= 5 AND automation_potential >= 50)
                    AS automation_candidates
            "
        );
        let row = sqlx::query(&counts_sql)
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err)?;

        let total_emails: i64 = row.try_get("total_emails").unwrap_or(0);
        let last_24h: i64 = row.try_get("last_24h").unwrap_or(0);
        let unprocessed: i64 = row.try_get("unprocessed").unwrap_or(0);
        let active: i64 = row.try_get("active_escalations").unwrap_or(0);
        let candidates: i64 = row.try_get("automation_candidates").unwrap_or(0);

        let category_sql = format!(
            "SELECT category, COUNT(*) AS count FROM {classifications} GROUP BY category"
        );
        let category_rows = sqlx::query(&category_sql)
            .fetch_all(&self.pool)
            .await
            .map_err(sql_err)?;

        let mut category_counts = HashMap::new();
        for row in category_rows {
            let category: String = row.try_get("category").unwrap_or_default();
            let count: i64 = row.try_get("count").unwrap_or(0);
            #[allow(clippy::cast_sign_loss)]
            category_counts.insert(category, count as u64);
        }

        Ok(DashboardSnapshot {
            total_emails: total_emails as u64,
            emails_last_24h: last_24h as u64,
            unprocessed: unprocessed as u64,
            active_escalations: active as u64,
            processing_7d: self.processing_statistics(7).await?,
            category_counts,
            automation_candidates: candidates as u64,
        })
    }
}
