use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use triage_chat::{ChatGateway, GroupSpec};
use triage_core::{Classification, EmailMessage, EscalationGroup, EscalationPlan, TriageError};
use triage_llm::{LlmClient, json_envelope};

use crate::config::ExpertiseMap;
use crate::prompts::{ESCALATE_SYSTEM, escalation_prompt};

/// Characters of the email body quoted in the initial group message.
const BODY_QUOTE_CHARS: usize = 500;

/// Builds responder groups for messages that need human intervention.
pub struct Escalator {
    llm: Arc<dyn LlmClient>,
    chat: Arc<dyn ChatGateway>,
    expertise: ExpertiseMap,
    owner_address: String,
}

impl Escalator {
    /// Create an escalator over the given model client and chat gateway.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        chat: Arc<dyn ChatGateway>,
        expertise: ExpertiseMap,
        owner_address: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            chat,
            expertise,
            owner_address: owner_address.into(),
        }
    }

    /// Run the full escalation: plan, resolve members, create the group,
    /// post the initial message, and return the group record for the store.
    ///
    /// A planning failure degrades to the default plan; a chat failure is
    /// the caller's signal to downgrade the email to manual review (no
    /// partial group is returned).
    pub async fn escalate(
        &self,
        email: &EmailMessage,
        classification: &Classification,
    ) -> Result<EscalationGroup, TriageError> {
        let plan = self.plan(email, classification).await;

        let roles = if plan.team_members.is_empty() {
            classification.required_expertise.clone()
        } else {
            plan.team_members.clone()
        };
        let members = self
            .expertise
            .resolve(&roles, classification.category, classification.urgency);

        let name = group_name(email, classification);
        let description = format!(
            "EmailBot escalation for email from {}: {}",
            email.sender_address, email.subject
        );

        let spec = GroupSpec {
            name: name.clone(),
            description: description.clone(),
            members: members.clone(),
            owner: self.owner_address.clone(),
        };

        let group_id = self
            .chat
            .create_group(&spec)
            .await
            .map_err(TriageError::from)?;

        let message = initial_message(email, classification, &plan);
        self.chat
            .post_message(&group_id, &message)
            .await
            .map_err(TriageError::from)?;

        info!(
            email_id = %email.id,
            group_id = %group_id,
            members = members.len(),
            "escalation group created"
        );

        Ok(EscalationGroup::new(
            group_id,
            email.id.clone(),
            name,
            description,
            members,
            self.owner_address.clone(),
        ))
    }

    /// Ask the model for an escalation plan, degrading to the default on
    /// any failure.
    async fn plan(
        &self,
        email: &EmailMessage,
        classification: &Classification,
    ) -> EscalationPlan {
        let prompt = escalation_prompt(email, classification);

        let reply = match self.llm.complete(ESCALATE_SYSTEM, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(email_id = %email.id, error = %e, "escalation planning failed, using defaults");
                return EscalationPlan::fallback();
            }
        };

        let Some(envelope) = json_envelope(&reply.content) else {
            warn!(email_id = %email.id, "escalation plan had no JSON envelope, using defaults");
            return EscalationPlan::fallback();
        };

        serde_json::from_value(envelope).unwrap_or_else(|e| {
            warn!(email_id = %email.id, error = %e, "escalation plan did not match contract");
            EscalationPlan::fallback()
        })
    }
}

/// Build the group display name:
/// `EmailBot-<CATEGORY>-<yyyymmdd-HHMM>-<subject-slug-30>`.
fn group_name(email: &EmailMessage, classification: &Classification) -> String {
    let timestamp = Utc::now().format("%Y%m%d-%H%M");
    let slug: String = email
        .subject
        .chars()
        .take(30)
        .map(|c| match c {
            ' ' | '/' => '-',
            other => other,
        })
        .collect();
    format!(
        "EmailBot-{}-{timestamp}-{slug}",
        classification.category.as_str()
    )
}

/// Build the initial HTML message posted into the group.
fn initial_message(
    email: &EmailMessage,
    classification: &Classification,
    plan: &EscalationPlan,
) -> String {
    let body_quote: String = email.body.chars().take(BODY_QUOTE_CHARS).collect();
    let ellipsis = if email.body.chars().count() > BODY_QUOTE_CHARS {
        "..."
    } else {
        ""
    };

    let mut message = format!(
        r"<h2>EmailBot Escalation</h2>

<h3>Email Details</h3>
<ul>
<li><strong>From:</strong> {sender}</li>
<li><strong>Subject:</strong> {subject}</li>
<li><strong>Received:</strong> {received}</li>
<li><strong>Email ID:</strong> {id}</li>
</ul>

<h3>Classification</h3>
<ul>
<li><strong>Category:</strong> {category}</li>
<li><strong>Confidence:</strong> {confidence}%</li>
<li><strong>Urgency:</strong> {urgency}</li>
<li><strong>Estimated Effort:</strong> {effort}</li>
</ul>

<h3>Reasoning</h3>
<p>{reasoning}</p>

<h3>Suggested Action</h3>
<p>{action}</p>

<h3>Escalation Details</h3>
<ul>
<li><strong>Reason:</strong> {reason}</li>
<li><strong>Priority:</strong> {priority}</li>
<li><strong>Estimated Resolution:</strong> {resolution}</li>
</ul>
",
        sender = email.sender_address,
        subject = email.subject,
        received = email.received_at.format("%Y-%m-%d %H:%M:%S UTC"),
        id = email.id,
        category = classification.category,
        confidence = classification.confidence,
        urgency = classification.urgency,
        effort = classification.estimated_effort,
        reasoning = classification.reasoning,
        action = classification.suggested_action,
        reason = plan.escalation_reason,
        priority = plan.priority,
        resolution = plan.estimated_resolution_time,
    );

    let _ = write!(
        message,
        "\n<h3>Initial Actions</h3>\n<ul>\n{}</ul>\n",
        format_list_items(&plan.suggested_initial_actions)
    );
    let _ = write!(
        message,
        "\n<h3>Required Resources</h3>\n<ul>\n{}</ul>\n",
        format_list_items(&plan.resources_needed)
    );
    let _ = write!(
        message,
        "\n<h3>Email Content</h3>\n<blockquote>{body_quote}{ellipsis}</blockquote>\n\
         <hr>\n<p><em>This escalation was automatically created by EmailBot. \
         Please acknowledge and assign ownership.</em></p>"
    );

    message
}

fn format_list_items(items: &[String]) -> String {
    if items.is_empty() {
        return "<li>None specified</li>\n".to_owned();
    }
    items
        .iter()
        .map(|item| format!("<li>{item}</li>\n"))
        .collect()
}

/// Build the resolution message posted when an escalation is closed.
#[must_use]
pub fn resolution_message(notes: &str) -> String {
    format!(
        r"<h3>Escalation Resolved</h3>
<p><strong>Resolution Notes:</strong></p>
<blockquote>{notes}</blockquote>
<p><em>Resolved at: {}</em></p>",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}
