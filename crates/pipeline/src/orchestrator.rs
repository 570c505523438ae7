use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use triage_core::{
    AuditEvent, EmailMessage, PerformanceMetric, ProcessingStatus, RoutingAction, SecurityEvent,
    SecuritySeverity, StageTimings, TriageError, route,
};
use triage_mail::MailGateway;
use triage_ratelimit::{Decision, SlidingWindowLimiter};
use triage_state::{KeyKind, StateKey, StateStore};
use triage_store::{ProcessingOutcome, StoreError, TriageStore};

use crate::classifier::Classifier;
use crate::config::PipelineConfig;
use crate::escalator::Escalator;
use crate::metrics::PipelineMetrics;
use crate::patterns;
use crate::responder::Responder;

/// TTL for idempotency marks.
const SEEN_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 3600);

/// State-store key holding the polling high-watermark.
const WATERMARK_ID: &str = "mailbox";

/// Identifier gating whole cycles.
const CYCLE_LIMIT_ID: &str = "email_processing";

/// Identifier gating model calls.
const LLM_LIMIT_ID: &str = "llm";

/// Outcome of processing one message within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EmailOutcome {
    /// Reached `Completed`.
    Completed,
    /// Reached `Failed`.
    Failed,
    /// Duplicate delivery, skipped.
    Duplicate,
    /// Deferred by the model rate limiter; re-attempted next cycle.
    Deferred,
}

impl EmailOutcome {
    /// Whether the watermark may advance past this message.
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Duplicate)
    }
}

/// Summary of one processing cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    /// Messages returned by the fetch.
    pub fetched: u64,
    /// Messages that reached `Completed`.
    pub completed: u64,
    /// Messages that reached `Failed`.
    pub failed: u64,
    /// Duplicate deliveries skipped.
    pub duplicates_skipped: u64,
    /// Messages deferred by rate limiting.
    pub deferred: u64,
    /// Errors encountered, one entry per affected message.
    pub errors: Vec<String>,
    /// Wall-clock cycle duration.
    pub processing_time_ms: u64,
    /// High-watermark after the cycle.
    pub watermark: Option<DateTime<Utc>>,
}

/// Drives each message through the processing state machine and records
/// every transition in the store.
///
/// The orchestrator is the only mutator of email lifecycle state. It is
/// idempotent per email id: a message whose processing record is already
/// `Completed` is skipped with a duplicate-ingestion audit entry.
pub struct Orchestrator {
    store: Arc<dyn TriageStore>,
    state: Arc<dyn StateStore>,
    mail: Arc<dyn MailGateway>,
    classifier: Classifier,
    responder: Responder,
    escalator: Escalator,
    cycle_limiter: Arc<SlidingWindowLimiter>,
    llm_limiter: Arc<SlidingWindowLimiter>,
    metrics: Arc<PipelineMetrics>,
    config: PipelineConfig,
}

struct StageTracker {
    current: Mutex<ProcessingStatus>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: Mutex::new(ProcessingStatus::Received),
        }
    }

    fn set(&self, status: ProcessingStatus) {
        *self.current.lock().expect("stage tracker lock poisoned") = status;
    }

    fn get(&self) -> ProcessingStatus {
        *self.current.lock().expect("stage tracker lock poisoned")
    }
}

impl Orchestrator {
    /// Wire an orchestrator from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TriageStore>,
        state: Arc<dyn StateStore>,
        mail: Arc<dyn MailGateway>,
        classifier: Classifier,
        responder: Responder,
        escalator: Escalator,
        cycle_limiter: Arc<SlidingWindowLimiter>,
        llm_limiter: Arc<SlidingWindowLimiter>,
        metrics: Arc<PipelineMetrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            state,
            mail,
            classifier,
            responder,
            escalator,
            cycle_limiter,
            llm_limiter,
            metrics,
            config,
        }
    }

    /// Shared metrics handle.
    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one processing cycle: fetch unread mail past the high-watermark,
    /// process the batch concurrently, and advance the watermark past the
    /// contiguous prefix of terminal messages.
    pub async fn process_cycle(&self) -> CycleSummary {
        let cycle_start = Instant::now();
        let mut summary = CycleSummary::default();
        self.metrics.record_cycle();

        if let Decision::Denied { retry_after_secs }
        | Decision::BurstDenied { retry_after_secs } = self.cycle_limiter.check(CYCLE_LIMIT_ID)
        {
            warn!(retry_after_secs, "cycle suppressed by rate limiter");
            self.record_rate_limit_event(CYCLE_LIMIT_ID).await;
            summary
                .errors
                .push(format!("rate limited, retry after {retry_after_secs}s"));
            return summary;
        }

        let watermark = self.load_watermark().await;
        summary.watermark = watermark;

        let emails = match self.mail.fetch_unread(watermark).await {
            Ok(emails) => emails,
            Err(e) => {
                error!(error = %e, "unread fetch failed");
                self.audit_failure("gateway", "fetch_unread", &e.to_string()).await;
                summary.errors.push(format!("fetch failed: {e}"));
                return summary;
            }
        };

        summary.fetched = emails.len() as u64;
        self.metrics.record_fetched(summary.fetched);
        if emails.is_empty() {
            debug!("no new mail");
            return summary;
        }

        info!(count = emails.len(), "processing cycle started");

        let concurrency = self.config.worker_concurrency.max(1);
        let results: Vec<(DateTime<Utc>, EmailOutcome)> = futures::stream::iter(
            emails.into_iter().map(|email| {
                let received_at = email.received_at;
                async move { (received_at, self.process_email(email).await) }
            }),
        )
        .buffer_unordered(concurrency)
        .collect()
        .await;

        let mut ordered = results;
        ordered.sort_by_key(|(received_at, _)| *received_at);

        // The watermark advances only past the contiguous prefix of
        // messages that reached a terminal state; a deferred message blocks
        // it so the next cycle picks that message up again.
        let mut new_watermark = watermark;
        let mut blocked = false;
        for (received_at, outcome) in &ordered {
            match outcome {
                EmailOutcome::Completed => {
                    summary.completed += 1;
                    if !blocked {
                        new_watermark = Some(*received_at);
                    }
                }
                EmailOutcome::Failed => {
                    summary.failed += 1;
                    summary.errors.push(format!("message at {received_at} failed"));
                    if !blocked {
                        new_watermark = Some(*received_at);
                    }
                }
                EmailOutcome::Duplicate => {
                    summary.duplicates_skipped += 1;
                    if !blocked {
                        new_watermark = Some(*received_at);
                    }
                }
                EmailOutcome::Deferred => {
                    summary.deferred += 1;
                    blocked = true;
                }
            }
            if !outcome.is_terminal() {
                blocked = true;
            }
        }

        if new_watermark != watermark {
            self.save_watermark(new_watermark).await;
        }
        summary.watermark = new_watermark;

        #[allow(clippy::cast_possible_truncation)]
        {
            summary.processing_time_ms = cycle_start.elapsed().as_millis() as u64;
        }

        let _ = self
            .store
            .record_metric(
                &PerformanceMetric::now("volume", "cycle_emails", summary.fetched as f64, "count"),
            )
            .await;

        info!(
            completed = summary.completed,
            failed = summary.failed,
            deferred = summary.deferred,
            duplicates = summary.duplicates_skipped,
            elapsed_ms = summary.processing_time_ms,
            "processing cycle finished"
        );
        summary
    }

    /// Drive one message through the state machine.
    async fn process_email(&self, mut email: EmailMessage) -> EmailOutcome {
        let email_id = email.id.clone();

        // Body cap: truncation is recorded, never silent.
        if email.body.chars().count() > self.config.max_email_body_length {
            let original_chars = email.body.chars().count();
            email.body = email
                .body
                .chars()
                .take(self.config.max_email_body_length)
                .collect();
            let event = AuditEvent::success("pipeline", "body_truncated", "orchestrator")
                .with_resource("email", email_id.as_str())
                .with_details(serde_json::json!({
                    "original_chars": original_chars,
                    "stored_chars": self.config.max_email_body_length,
                }));
            let _ = self.store.put_audit(&event).await;
        }

        // Idempotent ingestion: an existing row plus a completed processing
        // record means this is a duplicate delivery.
        let inserted = match self.store.put_email(&email).await {
            Ok(inserted) => inserted,
            Err(StoreError::Conflict(_)) => false,
            Err(e) => {
                error!(email_id = %email_id, error = %e, "email persist failed");
                return EmailOutcome::Failed;
            }
        };

        let fresh_mark = self
            .state
            .check_and_set(
                &StateKey::new(KeyKind::Seen, email_id.as_str()),
                "1",
                Some(SEEN_TTL),
            )
            .await
            .unwrap_or(true);

        if !inserted || !fresh_mark {
            match self.store.get_processing(&email_id).await {
                Ok(Some(record)) if record.status == ProcessingStatus::Completed => {
                    let event =
                        AuditEvent::success("pipeline", "duplicate_ingestion", "orchestrator")
                            .with_resource("email", email_id.as_str());
                    let _ = self.store.put_audit(&event).await;
                    self.metrics.record_duplicate();
                    debug!(email_id = %email_id, "duplicate delivery skipped");
                    return EmailOutcome::Duplicate;
                }
                _ => {}
            }
        }

        // Model budget: a denied message is left untouched for the next
        // cycle rather than advanced into a stage it cannot finish.
        if !self.llm_limiter.check(LLM_LIMIT_ID).is_allowed() {
            self.record_rate_limit_event(LLM_LIMIT_ID).await;
            self.metrics.record_rate_limit_deferral();
            debug!(email_id = %email_id, "deferred by model rate limiter");
            return EmailOutcome::Deferred;
        }

        if self.store.begin_processing(&email_id).await.is_err() {
            return EmailOutcome::Failed;
        }

        let tracker = StageTracker::new();
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.config.max_processing_time,
            self.run_stages(&email, &tracker, started),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                self.metrics.record_completed();
                EmailOutcome::Completed
            }
            Ok(Err(e)) => {
                self.fail_email(&email, &e.to_string(), tracker.get()).await;
                EmailOutcome::Failed
            }
            Err(_) => {
                let stage = tracker.get();
                warn!(email_id = %email_id, stage = %stage, "per-email processing budget exhausted");
                self.fail_email(&email, "processing timed out", stage).await;
                EmailOutcome::Failed
            }
        }
    }

    /// The VALIDATING → ... → COMPLETED stages, run under the per-email
    /// timeout. Any error return transitions the message to FAILED with the
    /// stage held by the tracker.
    async fn run_stages(
        &self,
        email: &EmailMessage,
        tracker: &StageTracker,
        started: Instant,
    ) -> Result<(), TriageError> {
        let email_id = &email.id;
        let mut timings = StageTimings::default();
        let mut retry_count = 0u32;

        // -- VALIDATING --
        self.transition(email, ProcessingStatus::Validating, tracker).await?;
        if email.sender_address.trim().is_empty() {
            return Err(TriageError::Malformed("message has no sender".to_owned()));
        }

        // -- CLASSIFYING --
        self.transition(email, ProcessingStatus::Classifying, tracker).await?;
        let classify_start = Instant::now();
        let (classification, fallback_used) = self.classifier.classify(email).await;
        #[allow(clippy::cast_possible_truncation)]
        {
            timings.classification_ms = classify_start.elapsed().as_millis() as u64;
        }

        if fallback_used {
            let event = AuditEvent::failure(
                "pipeline",
                "classification_fallback",
                "orchestrator",
                "parse_error",
            )
            .with_resource("email", email_id.as_str())
            .with_details(serde_json::json!({ "reasoning": classification.reasoning }));
            let _ = self.store.put_audit(&event).await;
        }

        // A leftover classification from an interrupted earlier attempt is
        // reused rather than overwritten; the stored row wins.
        let classification = match self.store.put_classification(email_id, &classification).await
        {
            Ok(()) => classification,
            Err(StoreError::Conflict(_)) => self
                .store
                .get_classification(email_id)
                .await
                .ok()
                .flatten()
                .unwrap_or(classification),
            Err(e) => return Err(e.into()),
        };

        let _ = self
            .store
            .record_metric(
                &PerformanceMetric::now(
                    "latency",
                    "classification_time",
                    timings.classification_ms as f64,
                    "ms",
                )
                .with_email(email_id.clone())
                .with_category(classification.category.as_str()),
            )
            .await;

        for observation in patterns::observations(email, &classification) {
            if let Err(e) = self.store.upsert_pattern(&observation).await {
                debug!(email_id = %email_id, error = %e, "pattern upsert failed");
            }
        }

        // -- ROUTING --
        self.transition(email, ProcessingStatus::Routing, tracker).await?;
        let action = route(
            classification.confidence,
            classification.urgency,
            &self.config.thresholds,
        );
        let event = AuditEvent::success("pipeline", "routing_decision", "orchestrator")
            .with_resource("email", email_id.as_str())
            .with_details(serde_json::json!({
                "action": action.as_str(),
                "confidence": classification.confidence,
                "urgency": classification.urgency.as_str(),
            }));
        let _ = self.store.put_audit(&event).await;

        // -- RESPONDING / ESCALATING / REVIEWING --
        let outcome = match action {
            RoutingAction::AutoReply => {
                self.transition(email, ProcessingStatus::Responding, tracker).await?;
                let respond_start = Instant::now();
                let (result, attempts) = self
                    .with_retries(|| self.responder.respond(email, &classification))
                    .await;
                retry_count += attempts;
                #[allow(clippy::cast_possible_truncation)]
                {
                    timings.response_generation_ms = respond_start.elapsed().as_millis() as u64;
                }
                match result {
                    Ok(_reply) => {
                        self.audit_outbound(email_id.as_str(), "reply_sent", true, None).await;
                        self.metrics.record_auto_reply();
                        ProcessingOutcome {
                            action,
                            action_taken: format!(
                                "Automated response sent for {}",
                                classification.category
                            ),
                            response_sent: true,
                            escalation_ref: None,
                            timings,
                            retry_count,
                        }
                    }
                    Err(e) => {
                        // Send failure downgrades to manual review; the
                        // error is recorded, the email still completes.
                        warn!(email_id = %email_id, error = %e, "auto-reply failed, downgrading to review");
                        self.audit_outbound(email_id.as_str(), "reply_sent", false, Some(&e)).await;
                        self.transition(email, ProcessingStatus::Reviewing, tracker).await?;
                        self.metrics.record_manual_review();
                        ProcessingOutcome {
                            action: RoutingAction::ManualReview,
                            action_taken: format!(
                                "Flagged for manual review - automated reply failed: {e}"
                            ),
                            response_sent: false,
                            escalation_ref: None,
                            timings,
                            retry_count,
                        }
                    }
                }
            }
            RoutingAction::Draft => {
                self.transition(email, ProcessingStatus::Responding, tracker).await?;
                let respond_start = Instant::now();
                let draft = self.responder.generate(email, &classification).await;
                #[allow(clippy::cast_possible_truncation)]
                {
                    timings.response_generation_ms = respond_start.elapsed().as_millis() as u64;
                }
                self.metrics.record_draft();
                ProcessingOutcome {
                    action,
                    action_taken: format!(
                        "Generated suggested response for {} (requires review)\n\n---\n\n{draft}",
                        classification.category
                    ),
                    response_sent: false,
                    escalation_ref: None,
                    timings,
                    retry_count,
                }
            }
            RoutingAction::Escalate => {
                self.transition(email, ProcessingStatus::Escalating, tracker).await?;
                let (result, attempts) = self
                    .with_retries(|| self.escalator.escalate(email, &classification))
                    .await;
                retry_count += attempts;
                match result {
                    Ok(group) => {
                        let group_id = group.group_id.clone();
                        self.store.put_escalation(&group).await.map_err(TriageError::from)?;
                        self.audit_outbound(email_id.as_str(), "escalation_created", true, None)
                            .await;
                        self.metrics.record_escalation();
                        ProcessingOutcome {
                            action,
                            action_taken: format!("Escalated to responder group: {}", group.name),
                            response_sent: false,
                            escalation_ref: Some(group_id),
                            timings,
                            retry_count,
                        }
                    }
                    Err(e) => {
                        // No partial group: a chat failure downgrades to
                        // manual review with the error on record.
                        warn!(email_id = %email_id, error = %e, "escalation failed, downgrading to review");
                        self.audit_outbound(email_id.as_str(), "escalation_created", false, Some(&e))
                            .await;
                        self.transition(email, ProcessingStatus::Reviewing, tracker).await?;
                        self.metrics.record_manual_review();
                        ProcessingOutcome {
                            action: RoutingAction::ManualReview,
                            action_taken: format!(
                                "Flagged for manual review - escalation failed: {e}"
                            ),
                            response_sent: false,
                            escalation_ref: None,
                            timings,
                            retry_count,
                        }
                    }
                }
            }
            RoutingAction::ManualReview => {
                self.transition(email, ProcessingStatus::Reviewing, tracker).await?;
                self.metrics.record_manual_review();
                ProcessingOutcome {
                    action,
                    action_taken: format!(
                        "Flagged for manual review - {} with {}% confidence",
                        classification.category, classification.confidence
                    ),
                    response_sent: false,
                    escalation_ref: None,
                    timings,
                    retry_count,
                }
            }
        };

        // -- COMPLETED --
        let mut outcome = outcome;
        #[allow(clippy::cast_possible_truncation)]
        {
            outcome.timings.processing_ms = started.elapsed().as_millis() as u64;
        }

        self.store
            .complete_processing(email_id, &outcome)
            .await
            .map_err(TriageError::from)?;
        self.transition(email, ProcessingStatus::Completed, tracker).await?;

        let (mark_result, _) = self
            .with_retries(|| async {
                self.mail.mark_read(email_id).await.map_err(TriageError::from)
            })
            .await;
        if let Err(e) = mark_result {
            // The message completed; an unread flag only means the next
            // fetch sees it again and the duplicate guard drops it.
            warn!(email_id = %email_id, error = %e, "mark-read failed after completion");
            self.audit_failure("gateway", "mark_read", &e.to_string()).await;
        }

        let _ = self
            .store
            .record_metric(
                &PerformanceMetric::now(
                    "latency",
                    "processing_time",
                    outcome.timings.processing_ms as f64,
                    "ms",
                )
                .with_email(email_id.clone()),
            )
            .await;

        Ok(())
    }

    /// Persist a stage transition before the stage's work begins.
    async fn transition(
        &self,
        email: &EmailMessage,
        status: ProcessingStatus,
        tracker: &StageTracker,
    ) -> Result<(), TriageError> {
        tracker.set(status);
        self.store
            .update_email_status(&email.id, status)
            .await
            .map_err(TriageError::from)?;

        let event = AuditEvent::success("pipeline", "stage_transition", "orchestrator")
            .with_resource("email", email.id.as_str())
            .with_details(serde_json::json!({ "stage": status.as_str() }));
        let _ = self.store.put_audit(&event).await;
        Ok(())
    }

    /// Transition a message to FAILED and record everything about why.
    async fn fail_email(&self, email: &EmailMessage, error: &str, stage: ProcessingStatus) {
        let email_id = &email.id;
        error!(email_id = %email_id, stage = %stage, error, "message processing failed");

        let _ = self
            .store
            .fail_processing(email_id, error, stage.as_str())
            .await;
        let _ = self
            .store
            .update_email_status(email_id, ProcessingStatus::Failed)
            .await;
        let _ = self
            .store
            .record_email_error(email_id, email.retry_count, error)
            .await;

        let event = AuditEvent::failure("pipeline", "processing_failed", "orchestrator", error)
            .with_resource("email", email_id.as_str())
            .with_details(serde_json::json!({ "stage": stage.as_str() }));
        let _ = self.store.put_audit(&event).await;
        self.metrics.record_failed();
    }

    /// Retry a retryable operation up to the configured budget. Returns the
    /// final result and how many retries were consumed.
    async fn with_retries<T, Fut>(
        &self,
        operation: impl Fn() -> Fut,
    ) -> (Result<T, TriageError>, u32)
    where
        Fut: Future<Output = Result<T, TriageError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt + 1 < self.config.retry_attempts.max(1) => {
                    attempt += 1;
                    warn!(attempt, error = %e, "retryable failure, backing off");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    async fn audit_outbound(
        &self,
        email_id: &str,
        action: &str,
        success: bool,
        error: Option<&TriageError>,
    ) {
        let event = if success {
            AuditEvent::success("gateway", action, "orchestrator")
        } else {
            AuditEvent::failure(
                "gateway",
                action,
                "orchestrator",
                error.map(ToString::to_string).unwrap_or_default(),
            )
        }
        .with_resource("email", email_id);
        let _ = self.store.put_audit(&event).await;
    }

    async fn audit_failure(&self, event_type: &str, action: &str, error: &str) {
        let event = AuditEvent::failure(event_type, action, "orchestrator", error);
        let _ = self.store.put_audit(&event).await;
    }

    async fn record_rate_limit_event(&self, identifier: &str) {
        let event = SecurityEvent::new(
            "rate_limit",
            SecuritySeverity::Warning,
            identifier,
            format!("rate limit tripped for {identifier}"),
        );
        let _ = self.store.record_security_event(&event).await;
    }

    async fn load_watermark(&self) -> Option<DateTime<Utc>> {
        let key = StateKey::new(KeyKind::Watermark, WATERMARK_ID);
        match self.state.get(&key).await {
            Ok(Some(raw)) => DateTime::parse_from_rfc3339(&raw)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }

    async fn save_watermark(&self, watermark: Option<DateTime<Utc>>) {
        let Some(watermark) = watermark else { return };
        let key = StateKey::new(KeyKind::Watermark, WATERMARK_ID);
        if let Err(e) = self.state.set(&key, &watermark.to_rfc3339(), None).await {
            warn!(error = %e, "watermark persist failed");
        }
    }
}
