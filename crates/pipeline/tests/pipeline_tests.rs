//! End-to-end pipeline scenarios against in-memory backends and mock
//! gateways.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use triage_core::{EmailMessage, ProcessingStatus, RoutingAction};
use triage_llm::{FailingLlmClient, LlmClient, MockLlmClient};
use triage_mail::{MailGateway, MockMailGateway};
use triage_chat::{ChatGateway, MockChatGateway};
use triage_pipeline::{
    Classifier, Escalator, ExpertiseMap, Orchestrator, PipelineConfig, PipelineMetrics, Responder,
    Scheduler,
};
use triage_ratelimit::{RateLimitConfig, SlidingWindowLimiter};
use triage_state::StateStore;
use triage_state_memory::MemoryStateStore;
use triage_store::TriageStore;
use triage_store_memory::MemoryTriageStore;

struct Harness {
    store: Arc<MemoryTriageStore>,
    mail: Arc<MockMailGateway>,
    chat: Arc<MockChatGateway>,
    orchestrator: Arc<Orchestrator>,
}

fn classification_reply(category: &str, confidence: f64, urgency: &str) -> String {
    serde_json::json!({
        "category": category,
        "confidence": confidence,
        "reasoning": "test classification",
        "urgency": urgency,
        "suggested_action": "handle it",
        "required_expertise": ["helpdesk"],
        "estimated_effort": "minutes"
    })
    .to_string()
}

fn escalation_plan_reply() -> String {
    serde_json::json!({
        "team_members": ["system_admin"],
        "escalation_reason": "needs humans",
        "priority": "high",
        "estimated_resolution_time": "1 hour",
        "suggested_initial_actions": ["triage"],
        "resources_needed": []
    })
    .to_string()
}

fn build(
    classify_llm: Arc<dyn LlmClient>,
    respond_llm: Arc<dyn LlmClient>,
    escalate_llm: Arc<dyn LlmClient>,
    llm_limit: usize,
    config: PipelineConfig,
) -> Harness {
    let store = Arc::new(MemoryTriageStore::new());
    let state = Arc::new(MemoryStateStore::new());
    let mail = Arc::new(MockMailGateway::new());
    let chat = Arc::new(MockChatGateway::new());

    let classifier = Classifier::new(classify_llm, config.prompt_body_chars);
    let responder = Responder::new(
        respond_llm,
        Arc::clone(&mail) as Arc<dyn MailGateway>,
        config.prompt_body_chars,
    );
    let escalator = Escalator::new(
        escalate_llm,
        Arc::clone(&chat) as Arc<dyn ChatGateway>,
        ExpertiseMap::default(),
        "emailbot@example.com",
    );

    let cycle_limiter = Arc::new(SlidingWindowLimiter::new(RateLimitConfig::new(
        100,
        Duration::from_secs(60),
    )));
    let llm_limiter = Arc::new(SlidingWindowLimiter::new(RateLimitConfig {
        max_requests: llm_limit,
        window: Duration::from_secs(60),
        burst_max: llm_limit.max(1),
        burst_window: Duration::from_secs(10),
    }));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store) as Arc<dyn TriageStore>,
        Arc::clone(&state) as Arc<dyn StateStore>,
        Arc::clone(&mail) as Arc<dyn MailGateway>,
        classifier,
        responder,
        escalator,
        cycle_limiter,
        llm_limiter,
        Arc::new(PipelineMetrics::new()),
        config,
    ));

    Harness {
        store,
        mail,
        chat,
        orchestrator,
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry_attempts: 1,
        retry_delay: Duration::from_millis(5),
        ..PipelineConfig::default()
    }
}

fn email(id: &str, subject: &str, body: &str) -> EmailMessage {
    EmailMessage::new(
        id,
        "user@example.com",
        "it@example.com",
        subject,
        body,
        Utc::now(),
    )
}

/// S1 — straightforward support request is answered automatically.
#[tokio::test]
async fn high_confidence_support_gets_auto_reply() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 92.0, "MEDIUM",
        ))),
        Arc::new(MockLlmClient::returning(
            "We have sent you a password reset link.",
        )),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );

    harness.mail.push_email(email(
        "s1",
        "Password reset",
        "I forgot my password, please help.",
    ));

    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);

    let replies = harness.mail.sent_replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].subject.starts_with("Re: Password reset"));

    let id = triage_core::EmailId::new("s1");
    let stored = harness.store.get_email(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProcessingStatus::Completed);
    assert!(stored.processed_at.is_some());

    let record = harness.store.get_processing(&id).await.unwrap().unwrap();
    assert!(record.response_sent);
    assert_eq!(record.routing_decision, Some(RoutingAction::AutoReply));
    assert!(!record.escalation_created);
    assert!(harness.chat.created_groups().is_empty());
    assert!(harness.mail.is_read(&id));
}

/// S2 — medium confidence produces a stored draft, nothing is sent.
#[tokio::test]
async fn medium_confidence_stores_draft_only() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "PURCHASING",
            70.0,
            "LOW",
        ))),
        Arc::new(MockLlmClient::returning("Draft: about your license...")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );

    harness.mail.push_email(email(
        "s2",
        "Maybe a license question?",
        "not sure if this is about SW license",
    ));

    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.completed, 1);
    assert!(harness.mail.sent_replies().is_empty());

    let id = triage_core::EmailId::new("s2");
    let record = harness.store.get_processing(&id).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Completed);
    assert_eq!(record.routing_decision, Some(RoutingAction::Draft));
    assert!(!record.response_sent);
    assert!(
        record
            .action_taken
            .as_deref()
            .unwrap()
            .contains("Draft: about your license")
    );
}

/// S3 — critical urgency preempts auto-reply and builds a responder group.
#[tokio::test]
async fn critical_urgency_escalates_despite_high_confidence() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "ESCALATION",
            88.0,
            "CRITICAL",
        ))),
        Arc::new(MockLlmClient::returning("should not be used")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );

    harness.mail.push_email(email(
        "s3",
        "PROD DOWN — payment gateway failing",
        "The payment gateway is down.",
    ));

    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.completed, 1);
    assert!(harness.mail.sent_replies().is_empty());

    let groups = harness.chat.created_groups();
    assert_eq!(groups.len(), 1);
    // Planned role plus the standing manager/security additions.
    assert!(groups[0].members.contains(&"sysadmin@example.com".to_owned()));
    assert!(groups[0].members.contains(&"itmanager@example.com".to_owned()));
    assert!(groups[0].members.contains(&"security@example.com".to_owned()));
    assert_eq!(harness.chat.posted_messages().len(), 1);

    let id = triage_core::EmailId::new("s3");
    let record = harness.store.get_processing(&id).await.unwrap().unwrap();
    assert!(record.escalation_created);
    assert!(record.escalation_ref.is_some());
    assert_eq!(record.routing_decision, Some(RoutingAction::Escalate));

    let active = harness.store.active_escalations().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].email_id, id);
}

/// S4 — total LLM outage still completes the email via fallback escalation.
#[tokio::test]
async fn llm_outage_falls_back_to_escalation() {
    let harness = build(
        Arc::new(FailingLlmClient::new("model unreachable")),
        Arc::new(FailingLlmClient::new("model unreachable")),
        Arc::new(FailingLlmClient::new("model unreachable")),
        100,
        fast_config(),
    );

    harness.mail.push_email(email("s4", "Anything", "any body"));

    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);

    let id = triage_core::EmailId::new("s4");
    let classification = harness.store.get_classification(&id).await.unwrap().unwrap();
    assert_eq!(classification.confidence, 0.0);
    assert!(classification.reasoning.starts_with("error:"));

    // Default plan resolves to it_admin only.
    let groups = harness.chat.created_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members, vec!["itadmin@example.com".to_owned()]);

    let stored = harness.store.get_email(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProcessingStatus::Completed);

    // The fallback leaves a parse-error audit trail.
    let audits = harness.store.audit_events();
    assert!(
        audits
            .iter()
            .any(|e| e.action == "classification_fallback" && e.error.as_deref() == Some("parse_error"))
    );
}

/// S5 — the same message delivered in two cycles is processed once.
#[tokio::test]
async fn duplicate_delivery_is_skipped() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 92.0, "MEDIUM",
        ))),
        Arc::new(MockLlmClient::returning("reply text")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );

    harness
        .mail
        .push_email(email("s5", "Password reset", "help"));
    let first = harness.orchestrator.process_cycle().await;
    assert_eq!(first.completed, 1);

    // Same id shows up again on the next cycle.
    harness
        .mail
        .push_email(email("s5", "Password reset", "help"));
    let second = harness.orchestrator.process_cycle().await;
    assert_eq!(second.completed, 0);
    assert_eq!(second.duplicates_skipped, 1);

    // Exactly one classification, one reply, no second group.
    assert_eq!(harness.mail.sent_replies().len(), 1);
    assert!(harness.chat.created_groups().is_empty());

    let audits = harness.store.audit_events();
    assert!(audits.iter().any(|e| e.action == "duplicate_ingestion"));
}

/// S6 — an LLM budget smaller than the batch defers the surplus untouched.
#[tokio::test]
async fn rate_limited_surplus_is_deferred() {
    let config = PipelineConfig {
        batch_size: 20,
        ..fast_config()
    };
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 92.0, "MEDIUM",
        ))),
        Arc::new(MockLlmClient::returning("reply")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        10,
        config,
    );

    for i in 0..20 {
        harness
            .mail
            .push_email(email(&format!("s6-{i:02}"), "Bulk", "body"));
    }

    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.fetched, 20);
    assert_eq!(summary.completed, 10);
    assert_eq!(summary.deferred, 10);

    // Deferred messages were not advanced past a stage that never ran.
    let mut deferred_seen = 0;
    for i in 0..20 {
        let id = triage_core::EmailId::new(format!("s6-{i:02}"));
        let stored = harness.store.get_email(&id).await.unwrap().unwrap();
        if stored.status == ProcessingStatus::Received {
            deferred_seen += 1;
            assert!(harness.store.get_processing(&id).await.unwrap().is_none());
        } else {
            assert_eq!(stored.status, ProcessingStatus::Completed);
        }
    }
    assert_eq!(deferred_seen, 10);

    // The limiter trip left a security event behind.
    assert!(
        harness
            .store
            .security_events()
            .iter()
            .any(|e| e.event_type == "rate_limit")
    );
}

/// Auto-reply send failure downgrades to manual review, not FAILED.
#[tokio::test]
async fn send_failure_downgrades_to_manual_review() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 95.0, "LOW",
        ))),
        Arc::new(MockLlmClient::returning("reply")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );
    harness.mail.fail_sends("smtp outage");

    harness.mail.push_email(email("dg", "Subject", "body"));
    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.completed, 1);

    let id = triage_core::EmailId::new("dg");
    let record = harness.store.get_processing(&id).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Completed);
    assert_eq!(record.routing_decision, Some(RoutingAction::ManualReview));
    assert!(!record.response_sent);
    assert!(record.action_taken.as_deref().unwrap().contains("reply failed"));
}

/// Chat outage during escalation downgrades to manual review with no
/// partial group.
#[tokio::test]
async fn chat_outage_downgrades_escalation() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "ESCALATION",
            90.0,
            "CRITICAL",
        ))),
        Arc::new(MockLlmClient::returning("unused")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );
    harness.chat.fail_creates("chat outage");

    harness.mail.push_email(email("co", "PROD DOWN", "down"));
    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.completed, 1);

    let id = triage_core::EmailId::new("co");
    let record = harness.store.get_processing(&id).await.unwrap().unwrap();
    assert_eq!(record.routing_decision, Some(RoutingAction::ManualReview));
    assert!(!record.escalation_created);
    assert!(harness.store.active_escalations().await.unwrap().is_empty());
}

/// Oversized bodies are stored truncated with an audit note and still
/// classified.
#[tokio::test]
async fn oversized_body_is_truncated_with_audit() {
    let config = PipelineConfig {
        max_email_body_length: 100,
        ..fast_config()
    };
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 92.0, "LOW",
        ))),
        Arc::new(MockLlmClient::returning("reply")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        config,
    );

    harness
        .mail
        .push_email(email("big", "Big", &"z".repeat(500)));
    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.completed, 1);

    let id = triage_core::EmailId::new("big");
    let stored = harness.store.get_email(&id).await.unwrap().unwrap();
    assert_eq!(stored.body.chars().count(), 100);

    let audits = harness.store.audit_events();
    assert!(audits.iter().any(|e| e.action == "body_truncated"));
}

/// Empty fetch completes cheaply and leaves the watermark unchanged.
#[tokio::test]
async fn empty_cycle_is_a_noop() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 92.0, "LOW",
        ))),
        Arc::new(MockLlmClient::returning("reply")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );

    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.fetched, 0);
    assert!(summary.watermark.is_none());
    assert!(summary.errors.is_empty());
}

/// The watermark advances to the newest terminal message after a clean
/// cycle, and bounds the next fetch.
#[tokio::test]
async fn watermark_advances_past_terminal_messages() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 92.0, "LOW",
        ))),
        Arc::new(MockLlmClient::returning("reply")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );

    let mut older = email("w-1", "First", "body");
    older.received_at = Utc::now() - chrono::Duration::minutes(10);
    let newer = email("w-2", "Second", "body");
    let newest_received = newer.received_at;

    harness.mail.push_email(older);
    harness.mail.push_email(newer);

    let summary = harness.orchestrator.process_cycle().await;
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.watermark, Some(newest_received));
}

/// The scheduler's single-flight guard and health accounting.
#[tokio::test]
async fn scheduler_immediate_trigger_and_health() {
    let harness = build(
        Arc::new(MockLlmClient::returning(classification_reply(
            "SUPPORT", 92.0, "LOW",
        ))),
        Arc::new(MockLlmClient::returning("reply")),
        Arc::new(MockLlmClient::returning(escalation_plan_reply())),
        100,
        fast_config(),
    );

    let scheduler = Scheduler::new(Arc::clone(&harness.orchestrator), Duration::from_secs(300));

    harness.mail.push_email(email("t-1", "Subject", "body"));
    let summary = scheduler.trigger_immediate().await.expect("not in flight");
    assert_eq!(summary.completed, 1);

    let status = scheduler.status();
    assert_eq!(status.run_count, 1);
    assert_eq!(status.error_count, 0);

    // Not started via run(), so health reports it as not running.
    let health = scheduler.health();
    assert!(!health.healthy);
    assert!(health.reasons.iter().any(|r| r.contains("not running")));
}
