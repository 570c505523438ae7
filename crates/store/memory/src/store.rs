use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use triage_core::{
    AuditEvent, AuthenticationAttempt, Classification, EmailId, EmailMessage, EmailPattern,
    EscalationGroup, GroupId, GroupStatus, HumanFeedback, PerformanceMetric, ProcessingRecord,
    ProcessingStatus, RoutingAction, SecurityEvent, pattern_id,
};
use triage_store::{
    CategoryCount, ClassificationStatistics, DashboardSnapshot, MetricAggregate, MetricsSummary,
    PatternObservation, ProcessingOutcome, ProcessingStatistics, StoreError, TriageStore,
};

#[derive(Default)]
struct Inner {
    emails: HashMap<String, EmailMessage>,
    classifications: HashMap<String, Classification>,
    // Newest attempt last.
    processing: HashMap<String, Vec<ProcessingRecord>>,
    escalations: HashMap<String, EscalationGroup>,
    patterns: HashMap<String, EmailPattern>,
    metrics: Vec<PerformanceMetric>,
    audit: Vec<AuditEvent>,
    auth_attempts: Vec<AuthenticationAttempt>,
    security_events: Vec<SecurityEvent>,
}

/// In-memory [`TriageStore`].
///
/// Mirrors the durable backend's semantics (idempotent email insert,
/// classification uniqueness, monotonic pattern frequency) without
/// encryption — fields at rest in process memory only. Intended for tests
/// and local development.
#[derive(Default)]
pub struct MemoryTriageStore {
    inner: Mutex<Inner>,
}

impl MemoryTriageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit events recorded (test helper).
    pub fn audit_len(&self) -> usize {
        self.lock().audit.len()
    }

    /// Clone of all audit events recorded (test helper).
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.lock().audit.clone()
    }

    /// Clone of all security events recorded (test helper).
    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.lock().security_events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }
}

#[async_trait]
impl TriageStore for MemoryTriageStore {
    async fn put_email(&self, email: &EmailMessage) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.emails.contains_key(email.id.as_str()) {
            return Ok(false);
        }
        inner
            .emails
            .insert(email.id.as_str().to_owned(), email.clone());
        Ok(true)
    }

    async fn get_email(&self, id: &EmailId) -> Result<Option<EmailMessage>, StoreError> {
        Ok(self.lock().emails.get(id.as_str()).cloned())
    }

    async fn update_email_status(
        &self,
        id: &EmailId,
        status: ProcessingStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let email = inner
            .emails
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("email {id}")))?;
        email.status = status;
        if status.is_terminal() {
            email.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_email_error(
        &self,
        id: &EmailId,
        retry_count: u32,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let email = inner
            .emails
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("email {id}")))?;
        email.retry_count = retry_count;
        email.last_error = Some(error.to_owned());
        Ok(())
    }

    async fn unprocessed_emails(&self, limit: u32) -> Result<Vec<EmailMessage>, StoreError> {
        let inner = self.lock();
        let mut emails: Vec<_> = inner
            .emails
            .values()
            .filter(|e| !e.status.is_terminal())
            .cloned()
            .collect();
        emails.sort_by_key(|e| e.received_at);
        emails.truncate(limit as usize);
        Ok(emails)
    }

    async fn emails_by_sender(
        &self,
        sender: &str,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, StoreError> {
        let inner = self.lock();
        let mut emails: Vec<_> = inner
            .emails
            .values()
            .filter(|e| e.sender_address.eq_ignore_ascii_case(sender))
            .cloned()
            .collect();
        emails.sort_by_key(|e| std::cmp::Reverse(e.received_at));
        emails.truncate(limit as usize);
        Ok(emails)
    }

    async fn emails_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<EmailMessage>, StoreError> {
        let inner = self.lock();
        let mut emails: Vec<_> = inner
            .emails
            .values()
            .filter(|e| e.received_at >= from && e.received_at <= to)
            .cloned()
            .collect();
        emails.sort_by_key(|e| e.received_at);
        emails.truncate(limit as usize);
        Ok(emails)
    }

    async fn put_classification(
        &self,
        email_id: &EmailId,
        classification: &Classification,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.classifications.contains_key(email_id.as_str()) {
            return Err(StoreError::Conflict(format!(
                "classification already stored for email {email_id}"
            )));
        }
        inner
            .classifications
            .insert(email_id.as_str().to_owned(), classification.clone());
        Ok(())
    }

    async fn get_classification(
        &self,
        email_id: &EmailId,
    ) -> Result<Option<Classification>, StoreError> {
        Ok(self.lock().classifications.get(email_id.as_str()).cloned())
    }

    async fn add_human_feedback(
        &self,
        email_id: &EmailId,
        feedback: HumanFeedback,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let classification = inner
            .classifications
            .get_mut(email_id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("classification for {email_id}")))?;
        classification.human_feedback = Some(feedback);
        classification.feedback_notes = notes.map(ToOwned::to_owned);
        classification.feedback_at = Some(Utc::now());
        Ok(())
    }

    async fn begin_processing(
        &self,
        email_id: &EmailId,
    ) -> Result<ProcessingRecord, StoreError> {
        let mut inner = self.lock();
        let record = ProcessingRecord::begin(email_id.clone());
        inner
            .processing
            .entry(email_id.as_str().to_owned())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn get_processing(
        &self,
        email_id: &EmailId,
    ) -> Result<Option<ProcessingRecord>, StoreError> {
        Ok(self
            .lock()
            .processing
            .get(email_id.as_str())
            .and_then(|v| v.last().cloned()))
    }

    async fn complete_processing(
        &self,
        email_id: &EmailId,
        outcome: &ProcessingOutcome,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .processing
            .get_mut(email_id.as_str())
            .and_then(|v| v.last_mut())
            .ok_or_else(|| StoreError::NotFound(format!("processing for {email_id}")))?;
        record.status = ProcessingStatus::Completed;
        record.completed_at = Some(Utc::now());
        record.action_taken = Some(outcome.action_taken.clone());
        record.response_sent = outcome.response_sent;
        record.escalation_created = outcome.escalation_ref.is_some();
        record.escalation_ref = outcome
            .escalation_ref
            .as_ref()
            .map(|g| g.as_str().to_owned());
        record.timings = outcome.timings;
        record.retry_count = outcome.retry_count;
        record.routing_decision = Some(outcome.action);
        Ok(())
    }

    async fn fail_processing(
        &self,
        email_id: &EmailId,
        error: &str,
        stage: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .processing
            .get_mut(email_id.as_str())
            .and_then(|v| v.last_mut())
            .ok_or_else(|| StoreError::NotFound(format!("processing for {email_id}")))?;
        record.status = ProcessingStatus::Failed;
        record.completed_at = Some(Utc::now());
        record.error_message = Some(error.to_owned());
        record.error_stage = Some(stage.to_owned());
        Ok(())
    }

    async fn put_escalation(&self, group: &EscalationGroup) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.escalations.contains_key(group.group_id.as_str()) {
            return Err(StoreError::Conflict(format!(
                "escalation group {} already stored",
                group.group_id
            )));
        }
        inner
            .escalations
            .insert(group.group_id.as_str().to_owned(), group.clone());
        Ok(())
    }

    async fn resolve_escalation(
        &self,
        group_id: &GroupId,
        notes: &str,
    ) -> Result<EscalationGroup, StoreError> {
        let mut inner = self.lock();
        let group = inner
            .escalations
            .get_mut(group_id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("escalation group {group_id}")))?;
        if group.status == GroupStatus::Resolved {
            return Err(StoreError::Conflict(format!(
                "escalation group {group_id} is already resolved"
            )));
        }
        let now = Utc::now();
        group.status = GroupStatus::Resolved;
        group.resolved_at = Some(now);
        group.resolution_notes = Some(notes.to_owned());
        group.resolution_time_hours =
            Some((now - group.created_at).num_seconds() as f64 / 3600.0);
        Ok(group.clone())
    }

    async fn active_escalations(&self) -> Result<Vec<EscalationGroup>, StoreError> {
        let inner = self.lock();
        let mut groups: Vec<_> = inner
            .escalations
            .values()
            .filter(|g| g.status == GroupStatus::Active)
            .cloned()
            .collect();
        groups.sort_by_key(|g| std::cmp::Reverse(g.created_at));
        Ok(groups)
    }

    async fn upsert_pattern(
        &self,
        observation: &PatternObservation,
    ) -> Result<EmailPattern, StoreError> {
        let mut inner = self.lock();
        let id = pattern_id(observation.kind, &observation.signature);
        let now = Utc::now();

        let pattern = inner
            .patterns
            .entry(id.clone())
            .and_modify(|p| {
                p.frequency += 1;
                p.last_seen = now;
                p.automation_potential = observation.automation_potential;
                if !p.sample_email_ids.contains(&observation.email_id) {
                    p.sample_email_ids.push(observation.email_id.clone());
                }
                for keyword in &observation.keywords {
                    if !p.common_keywords.contains(keyword) {
                        p.common_keywords.push(keyword.clone());
                    }
                }
            })
            .or_insert_with(|| EmailPattern {
                id,
                kind: observation.kind,
                description: observation.description.clone(),
                frequency: 1,
                first_seen: now,
                last_seen: now,
                automation_potential: observation.automation_potential,
                sample_email_ids: vec![observation.email_id.clone()],
                common_keywords: observation.keywords.clone(),
                time_savings_minutes: observation.time_savings_minutes,
            });

        Ok(pattern.clone())
    }

    async fn automation_candidates(
        &self,
        min_frequency: u64,
        min_potential: f64,
    ) -> Result<Vec<EmailPattern>, StoreError> {
        let inner = self.lock();
        let mut patterns: Vec<_> = inner
            .patterns
            .values()
            .filter(|p| p.frequency >= min_frequency && p.automation_potential >= min_potential)
            .cloned()
            .collect();
        patterns.sort_by_key(|p| std::cmp::Reverse(p.frequency));
        Ok(patterns)
    }

    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<(), StoreError> {
        self.lock().metrics.push(metric.clone());
        Ok(())
    }

    async fn metrics_summary(
        &self,
        kind: Option<&str>,
        days: u32,
    ) -> Result<MetricsSummary, StoreError> {
        let inner = self.lock();
        let cutoff = Utc::now() - Duration::days(i64::from(days));

        let mut grouped: HashMap<(String, String), Vec<f64>> = HashMap::new();
        for metric in &inner.metrics {
            if metric.recorded_at < cutoff {
                continue;
            }
            if let Some(k) = kind
                && metric.kind != k
            {
                continue;
            }
            grouped
                .entry((metric.kind.clone(), metric.name.clone()))
                .or_default()
                .push(metric.value);
        }

        let mut series: Vec<_> = grouped
            .into_iter()
            .map(|((kind, name), values)| {
                let count = values.len() as u64;
                let sum: f64 = values.iter().sum();
                MetricAggregate {
                    kind,
                    name,
                    count,
                    avg: sum / values.len() as f64,
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                }
            })
            .collect();
        series.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));

        Ok(MetricsSummary {
            window_days: days,
            kind: kind.map(ToOwned::to_owned),
            series,
        })
    }

    async fn put_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.lock().audit.push(event.clone());
        Ok(())
    }

    async fn record_auth_attempt(
        &self,
        attempt: &AuthenticationAttempt,
    ) -> Result<(), StoreError> {
        self.lock().auth_attempts.push(attempt.clone());
        Ok(())
    }

    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        self.lock().security_events.push(event.clone());
        Ok(())
    }

    async fn processing_statistics(
        &self,
        days: u32,
    ) -> Result<ProcessingStatistics, StoreError> {
        let inner = self.lock();
        let cutoff = Utc::now() - Duration::days(i64::from(days));

        let mut stats = ProcessingStatistics {
            window_days: days,
            ..ProcessingStatistics::default()
        };
        let mut total_ms = 0u64;
        let mut completed_with_time = 0u64;

        for record in inner.processing.values().flatten() {
            if record.started_at < cutoff {
                continue;
            }
            stats.total += 1;
            match record.status {
                ProcessingStatus::Completed => {
                    stats.completed += 1;
                    total_ms += record.timings.processing_ms;
                    completed_with_time += 1;
                    match record.routing_decision {
                        Some(RoutingAction::AutoReply) if record.response_sent => {
                            stats.auto_replies_sent += 1;
                        }
                        Some(RoutingAction::Draft) => stats.drafts_created += 1,
                        Some(RoutingAction::Escalate) if record.escalation_created => {
                            stats.escalations_created += 1;
                        }
                        _ => stats.manual_reviews += 1,
                    }
                }
                ProcessingStatus::Failed => stats.failed += 1,
                _ => {}
            }
        }

        if completed_with_time > 0 {
            stats.avg_processing_ms = total_ms as f64 / completed_with_time as f64;
        }
        Ok(stats)
    }

    async fn classification_statistics(&self) -> Result<ClassificationStatistics, StoreError> {
        let inner = self.lock();

        let mut stats = ClassificationStatistics::default();
        let mut by_category: HashMap<String, (u64, f64)> = HashMap::new();
        let mut confidence_sum = 0.0;

        for classification in inner.classifications.values() {
            stats.total += 1;
            confidence_sum += classification.confidence;
            let entry = by_category
                .entry(classification.category.as_str().to_owned())
                .or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += classification.confidence;

            match classification.human_feedback {
                Some(HumanFeedback::Correct) => stats.feedback_correct += 1,
                Some(HumanFeedback::Incorrect) => stats.feedback_incorrect += 1,
                Some(HumanFeedback::Partial) => stats.feedback_partial += 1,
                None => {}
            }
        }

        if stats.total > 0 {
            stats.avg_confidence = confidence_sum / stats.total as f64;
        }
        stats.by_category = by_category
            .into_iter()
            .map(|(category, (count, sum))| CategoryCount {
                category,
                count,
                avg_confidence: sum / count as f64,
            })
            .collect();
        stats.by_category.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(stats)
    }

    async fn dashboard_snapshot(&self) -> Result<DashboardSnapshot, StoreError> {
        let processing_7d = self.processing_statistics(7).await?;
        let inner = self.lock();
        let day_ago = Utc::now() - Duration::hours(24);

        let mut category_counts = HashMap::new();
        for classification in inner.classifications.values() {
            *category_counts
                .entry(classification.category.as_str().to_owned())
                .or_insert(0) += 1;
        }

        Ok(DashboardSnapshot {
            total_emails: inner.emails.len() as u64,
            emails_last_24h: inner
                .emails
                .values()
                .filter(|e| e.received_at >= day_ago)
                .count() as u64,
            unprocessed: inner
                .emails
                .values()
                .filter(|e| !e.status.is_terminal())
                .count() as u64,
            active_escalations: inner
                .escalations
                .values()
                .filter(|g| g.status == GroupStatus::Active)
                .count() as u64,
            processing_7d,
            category_counts,
            automation_candidates: inner
                .patterns
                .values()
                .filter(|p| p.frequency >= 5 && p.automation_potential >= 50.0)
                .count() as u64,
        })
    }
}
