//! Prompt assembly for the three LLM call sites.
//!
//! Pure string building; no I/O. The prompt version tag is stored with each
//! classification so results can be traced back to the prompt that produced
//! them.

use triage_core::{Classification, EmailMessage};

/// Version tag stored alongside classifications.
pub const PROMPT_VERSION: &str = "v1";

/// System prompt for classification calls.
pub const CLASSIFY_SYSTEM: &str = "You are an expert IT department email classifier. \
     Analyze emails and provide accurate categorization with confidence scores.";

/// System prompt for response generation calls.
pub const RESPOND_SYSTEM: &str = "You are a helpful IT support assistant. Generate \
     professional, accurate, and helpful email responses.";

/// System prompt for escalation planning calls.
pub const ESCALATE_SYSTEM: &str = "You are an IT escalation specialist. Determine \
     appropriate team composition and escalation strategies.";

/// Take at most `max` characters from `text` on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the classification prompt for one message.
#[must_use]
pub fn classification_prompt(email: &EmailMessage, body_chars: usize) -> String {
    format!(
        r#"Classify this email for the IT department.

Email Details:
Sender: {sender}
Sender Name: {sender_name}
Subject: {subject}
Received: {received}
Body: {body}

Classify this email into EXACTLY ONE category:
1. PURCHASING - Purchase requests, vendor quotes, software licensing, hardware procurement
2. SUPPORT - Technical issues, system problems, user assistance, troubleshooting
3. INFORMATION - General inquiries, documentation requests, policy questions
4. ESCALATION - Urgent issues, executive requests, critical system failures
5. CONSULTATION - Strategic planning, architecture decisions, technology assessments

Provide your response in this exact JSON format:
{{
  "category": "CATEGORY_NAME",
  "confidence": 85,
  "reasoning": "Brief explanation of classification decision",
  "urgency": "LOW|MEDIUM|HIGH|CRITICAL",
  "suggested_action": "Specific recommended action",
  "required_expertise": ["list", "of", "required", "skills"],
  "estimated_effort": "minutes or hours estimate"
}}

Confidence is a number from 0 to 100. Consider these factors:
- Sender domain and email patterns
- Subject line keywords and urgency indicators
- Body content and technical terminology
- Business context and organizational needs"#,
        sender = email.sender_address,
        sender_name = email.sender_name.as_deref().unwrap_or("N/A"),
        subject = email.subject,
        received = email.received_at.to_rfc3339(),
        body = truncate_chars(&email.body, body_chars),
    )
}

/// Build the response-generation prompt for one message.
#[must_use]
pub fn response_prompt(
    email: &EmailMessage,
    classification: &Classification,
    body_chars: usize,
) -> String {
    format!(
        r"Generate a professional email response for this IT department inquiry:

Original Email:
From: {sender}
Subject: {subject}
Body: {body}

Classification: {category}
Urgency: {urgency}
Confidence: {confidence}%

Guidelines:
- Be professional and helpful
- Acknowledge the specific request
- Provide relevant information or next steps
- Include appropriate timeframes
- Keep the response concise but complete

Generate a response that addresses their specific needs:",
        sender = email.sender_address,
        subject = email.subject,
        body = truncate_chars(&email.body, body_chars),
        category = classification.category,
        urgency = classification.urgency,
        confidence = classification.confidence,
    )
}

/// Build the escalation-planning prompt for one message.
#[must_use]
pub fn escalation_prompt(email: &EmailMessage, classification: &Classification) -> String {
    format!(
        r#"Assess escalation needs for this IT email:

Email: {subject}
From: {sender}
Category: {category}
Urgency: {urgency}
Confidence: {confidence}%
Required Expertise: {expertise}

Determine escalation strategy in JSON format:
{{
  "team_members": ["list of required team member roles"],
  "escalation_reason": "clear explanation of why escalation is needed",
  "priority": "low|medium|high|critical",
  "estimated_resolution_time": "time estimate",
  "suggested_initial_actions": ["list of immediate actions to take"],
  "resources_needed": ["list of systems, documentation, or tools needed"]
}}

Available team roles:
- it_admin (general IT administration)
- helpdesk (user support)
- system_admin (server and infrastructure)
- network_admin (networking and connectivity)
- security (cybersecurity and compliance)
- procurement (purchasing and vendor relations)
- manager (management and decision making)"#,
        subject = email.subject,
        sender = email.sender_address,
        category = classification.category,
        urgency = classification.urgency,
        confidence = classification.confidence,
        expertise = classification.required_expertise.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn email() -> EmailMessage {
        EmailMessage::new(
            "m-1",
            "user@example.com",
            "it@example.com",
            "Password reset",
            "I forgot my password, please help.",
            Utc::now(),
        )
    }

    #[test]
    fn classification_prompt_includes_details() {
        let prompt = classification_prompt(&email(), 2_000);
        assert!(prompt.contains("user@example.com"));
        assert!(prompt.contains("Password reset"));
        assert!(prompt.contains("I forgot my password"));
        assert!(prompt.contains("PURCHASING"));
        assert!(prompt.contains("0 to 100"));
    }

    #[test]
    fn classification_prompt_truncates_body() {
        let mut long = email();
        long.body = "x".repeat(5_000);
        let prompt = classification_prompt(&long, 100);
        assert!(!prompt.contains(&"x".repeat(101)));
        assert!(prompt.contains(&"x".repeat(100)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let out = truncate_chars(text, 3);
        assert_eq!(out, "hél");
    }

    #[test]
    fn response_prompt_includes_classification() {
        let classification = Classification::fallback("x");
        let prompt = response_prompt(&email(), &classification, 1_500);
        assert!(prompt.contains("INFORMATION"));
        assert!(prompt.contains("MEDIUM"));
    }

    #[test]
    fn escalation_prompt_lists_roles() {
        let classification = Classification::fallback("x");
        let prompt = escalation_prompt(&email(), &classification);
        assert!(prompt.contains("it_admin"));
        assert!(prompt.contains("team_members"));
        assert!(prompt.contains("security"));
    }
}
