//! Pattern signature derivation.
//!
//! After classification, each message contributes observations of recurring
//! structure: one for the sender's domain and one for the normalized
//! subject. The store increments frequencies; the dashboard surfaces
//! high-frequency, high-potential patterns as automation candidates.

use std::sync::LazyLock;

use regex::Regex;

use triage_core::{Classification, EmailMessage, PatternKind};
use triage_store::PatternObservation;

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit regex is valid"));

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9# ]+").expect("word regex is valid"));

static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("space regex is valid"));

/// Normalize a subject into a stable signature: lowercase, digits replaced
/// with `#`, punctuation dropped, whitespace collapsed.
#[must_use]
pub fn subject_signature(subject: &str) -> String {
    let lower = subject.to_lowercase();
    let digits = DIGITS_RE.replace_all(&lower, "#");
    let words = NON_WORD_RE.replace_all(&digits, " ");
    SPACE_RE.replace_all(&words, " ").trim().to_owned()
}

/// Keywords for an occurrence: subject words longer than three characters.
fn keywords(subject: &str) -> Vec<String> {
    subject_signature(subject)
        .split(' ')
        .filter(|w| w.len() > 3 && *w != "#")
        .map(ToOwned::to_owned)
        .take(8)
        .collect()
}

/// Automation potential heuristic for one occurrence: confident
/// classifications of routine categories score high, low-confidence or
/// escalation traffic scores low.
fn automation_potential(classification: &Classification) -> f64 {
    use triage_core::EmailCategory::{
        Consultation, Escalation, Information, Purchasing, Support,
    };
    let base = match classification.category {
        Support | Information => 70.0,
        Purchasing => 50.0,
        Consultation => 30.0,
        Escalation => 10.0,
    };
    (base * classification.confidence / 100.0).clamp(0.0, 100.0)
}

/// Derive the pattern observations one classified message contributes.
#[must_use]
pub fn observations(
    email: &EmailMessage,
    classification: &Classification,
) -> Vec<PatternObservation> {
    let potential = automation_potential(classification);
    let mut result = Vec::with_capacity(2);

    let domain = email.sender_domain();
    if !domain.is_empty() {
        result.push(PatternObservation {
            kind: PatternKind::Sender,
            signature: domain.clone(),
            description: format!("Mail from the {domain} domain"),
            automation_potential: potential,
            email_id: email.id.clone(),
            keywords: Vec::new(),
            time_savings_minutes: None,
        });
    }

    let signature = subject_signature(&email.subject);
    if !signature.is_empty() {
        result.push(PatternObservation {
            kind: PatternKind::Subject,
            signature: signature.clone(),
            description: format!("Recurring subject \"{signature}\""),
            automation_potential: potential,
            email_id: email.id.clone(),
            keywords: keywords(&email.subject),
            time_savings_minutes: Some(5.0),
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::EmailCategory;

    fn email(subject: &str) -> EmailMessage {
        EmailMessage::new(
            "m-1",
            "user@example.com",
            "it@example.com",
            subject,
            "body",
            Utc::now(),
        )
    }

    fn classification(category: EmailCategory, confidence: f64) -> Classification {
        let mut c = Classification::fallback("unused");
        c.category = category;
        c.confidence = confidence;
        c
    }

    #[test]
    fn signature_replaces_digits() {
        assert_eq!(
            subject_signature("Ticket #12345 still open"),
            "ticket ## still open"
        );
        assert_eq!(
            subject_signature("Ticket #67890 still open"),
            "ticket ## still open"
        );
    }

    #[test]
    fn signature_is_case_and_punctuation_insensitive() {
        assert_eq!(
            subject_signature("Password Reset!!!"),
            subject_signature("password reset")
        );
    }

    #[test]
    fn observations_cover_sender_and_subject() {
        let obs = observations(
            &email("Password reset"),
            &classification(EmailCategory::Support, 92.0),
        );
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].kind, PatternKind::Sender);
        assert_eq!(obs[0].signature, "example.com");
        assert_eq!(obs[1].kind, PatternKind::Subject);
        assert_eq!(obs[1].signature, "password reset");
        assert!(obs[1].keywords.contains(&"password".to_owned()));
    }

    #[test]
    fn potential_scales_with_confidence() {
        let high = observations(
            &email("Password reset"),
            &classification(EmailCategory::Support, 100.0),
        );
        let low = observations(
            &email("Password reset"),
            &classification(EmailCategory::Support, 10.0),
        );
        assert!(high[0].automation_potential > low[0].automation_potential);
    }

    #[test]
    fn escalations_score_low() {
        let obs = observations(
            &email("PROD DOWN"),
            &classification(EmailCategory::Escalation, 90.0),
        );
        assert!(obs[0].automation_potential < 20.0);
    }

    #[test]
    fn addressless_sender_contributes_subject_only() {
        let mut e = email("Password reset");
        e.sender_address = "nonsense".to_owned();
        let obs = observations(&e, &classification(EmailCategory::Support, 80.0));
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].kind, PatternKind::Subject);
    }
}
