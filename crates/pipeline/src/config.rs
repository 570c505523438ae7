use std::collections::HashMap;
use std::time::Duration;

use triage_core::{ConfidenceThresholds, EmailCategory, TriageError, UrgencyLevel};

/// Maps expertise role tags to responder addresses.
#[derive(Debug, Clone)]
pub struct ExpertiseMap {
    roles: HashMap<String, Vec<String>>,
}

impl ExpertiseMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: HashMap::new(),
        }
    }

    /// Register the addresses for a role tag.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>, addresses: Vec<String>) -> Self {
        self.roles.insert(role.into(), addresses);
        self
    }

    /// Addresses for a role tag, empty when unknown.
    #[must_use]
    pub fn addresses(&self, role: &str) -> &[String] {
        self.roles.get(role).map_or(&[], Vec::as_slice)
    }

    /// Resolve a member set for the given role tags, applying the standing
    /// additions: `manager` on elevated urgency, `procurement` for
    /// purchasing, `manager` and `security` for escalations, and the
    /// `it_admin` fallback when nothing resolves.
    #[must_use]
    pub fn resolve(
        &self,
        roles: &[String],
        category: EmailCategory,
        urgency: UrgencyLevel,
    ) -> Vec<String> {
        let mut members = Vec::new();
        let mut push_role = |map: &Self, role: &str, members: &mut Vec<String>| {
            for address in map.addresses(role) {
                if !members.contains(address) {
                    members.push(address.clone());
                }
            }
        };

        for role in roles {
            push_role(self, role, &mut members);
        }

        if urgency.is_elevated() {
            push_role(self, "manager", &mut members);
        }
        match category {
            EmailCategory::Purchasing => push_role(self, "procurement", &mut members),
            EmailCategory::Escalation => {
                push_role(self, "manager", &mut members);
                push_role(self, "security", &mut members);
            }
            _ => {}
        }

        if members.is_empty() {
            push_role(self, "it_admin", &mut members);
        }
        members
    }
}

impl Default for ExpertiseMap {
    fn default() -> Self {
        Self::new()
            .with_role("it_admin", vec!["itadmin@example.com".to_owned()])
            .with_role("helpdesk", vec!["helpdesk@example.com".to_owned()])
            .with_role("system_admin", vec!["sysadmin@example.com".to_owned()])
            .with_role("network_admin", vec!["netadmin@example.com".to_owned()])
            .with_role("security", vec!["security@example.com".to_owned()])
            .with_role("procurement", vec!["procurement@example.com".to_owned()])
            .with_role("manager", vec!["itmanager@example.com".to_owned()])
    }
}

/// Configuration for the processing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum emails per cycle.
    pub batch_size: u32,
    /// Total wall-clock budget per email.
    pub max_processing_time: Duration,
    /// Transient-failure retry budget per stage.
    pub retry_attempts: u32,
    /// Base delay between retries.
    pub retry_delay: Duration,
    /// Routing thresholds.
    pub thresholds: ConfidenceThresholds,
    /// Body characters included in classification prompts.
    pub prompt_body_chars: usize,
    /// Stored body length cap. Longer bodies are truncated with an audit
    /// note.
    pub max_email_body_length: usize,
    /// Expertise role map for escalation member resolution.
    pub expertise: ExpertiseMap,
    /// Owner address stamped on escalation groups.
    pub owner_address: String,
    /// Concurrent per-message workers within a cycle.
    pub worker_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_processing_time: Duration::from_secs(30 * 60),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(60),
            thresholds: ConfidenceThresholds::default(),
            prompt_body_chars: 2_000,
            max_email_body_length: 50_000,
            expertise: ExpertiseMap::default(),
            owner_address: "emailbot@example.com".to_owned(),
            worker_concurrency: 10,
        }
    }
}

impl PipelineConfig {
    /// Validate invariants that must hold before the pipeline starts.
    pub fn validate(&self) -> Result<(), TriageError> {
        self.thresholds.validate()?;
        if self.batch_size == 0 {
            return Err(TriageError::ConfigInvalid(
                "batch_size must be positive".to_owned(),
            ));
        }
        if self.worker_concurrency == 0 {
            return Err(TriageError::ConfigInvalid(
                "worker_concurrency must be positive".to_owned(),
            ));
        }
        if self.max_email_body_length == 0 {
            return Err(TriageError::ConfigInvalid(
                "max_email_body_length must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_batch_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_includes_requested_roles() {
        let map = ExpertiseMap::default();
        let members = map.resolve(
            &["helpdesk".to_owned()],
            EmailCategory::Support,
            UrgencyLevel::Low,
        );
        assert_eq!(members, vec!["helpdesk@example.com".to_owned()]);
    }

    #[test]
    fn elevated_urgency_adds_manager() {
        let map = ExpertiseMap::default();
        let members = map.resolve(
            &["helpdesk".to_owned()],
            EmailCategory::Support,
            UrgencyLevel::Critical,
        );
        assert!(members.contains(&"itmanager@example.com".to_owned()));
    }

    #[test]
    fn purchasing_adds_procurement() {
        let map = ExpertiseMap::default();
        let members = map.resolve(&[], EmailCategory::Purchasing, UrgencyLevel::Low);
        assert!(members.contains(&"procurement@example.com".to_owned()));
    }

    #[test]
    fn escalation_adds_manager_and_security() {
        let map = ExpertiseMap::default();
        let members = map.resolve(&[], EmailCategory::Escalation, UrgencyLevel::Medium);
        assert!(members.contains(&"itmanager@example.com".to_owned()));
        assert!(members.contains(&"security@example.com".to_owned()));
    }

    #[test]
    fn unknown_roles_fall_back_to_it_admin() {
        let map = ExpertiseMap::default();
        let members = map.resolve(
            &["astrologer".to_owned()],
            EmailCategory::Information,
            UrgencyLevel::Low,
        );
        assert_eq!(members, vec!["itadmin@example.com".to_owned()]);
    }

    #[test]
    fn members_are_deduplicated() {
        let map = ExpertiseMap::default();
        let members = map.resolve(
            &["manager".to_owned()],
            EmailCategory::Escalation,
            UrgencyLevel::Critical,
        );
        let manager_count = members
            .iter()
            .filter(|m| m.as_str() == "itmanager@example.com")
            .count();
        assert_eq!(manager_count, 1);
    }
}
