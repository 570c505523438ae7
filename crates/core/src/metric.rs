use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EmailId;

/// One observed performance measurement. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    /// Metric family, e.g. `latency`, `volume`, `accuracy`.
    pub kind: String,

    /// Metric name within the family, e.g. `classification_time`.
    pub name: String,

    /// Optional category dimension, e.g. an email category.
    pub category: Option<String>,

    /// Observed value.
    pub value: f64,

    /// Unit of the value, e.g. `ms`, `count`, `percent`.
    pub unit: String,

    /// Email the measurement belongs to, when per-message.
    pub email_id: Option<EmailId>,

    /// Aggregation window the measurement covers, when pre-aggregated.
    pub window: Option<String>,

    /// How pre-aggregated values were combined, e.g. `avg`, `p95`.
    pub aggregation: Option<String>,

    /// Free-form label dimensions.
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// When the measurement was taken.
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceMetric {
    /// Create a point measurement taken now.
    #[must_use]
    pub fn now(
        kind: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            category: None,
            value,
            unit: unit.into(),
            email_id: None,
            window: None,
            aggregation: None,
            tags: HashMap::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Attach the email the measurement belongs to.
    #[must_use]
    pub fn with_email(mut self, email_id: EmailId) -> Self {
        self.email_id = Some(email_id);
        self
    }

    /// Attach a category dimension.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach a label dimension.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let metric = PerformanceMetric::now("latency", "classification_time", 412.0, "ms")
            .with_email(EmailId::new("m-1"))
            .with_category("SUPPORT")
            .with_tag("model", "gpt-4");
        assert_eq!(metric.kind, "latency");
        assert_eq!(metric.value, 412.0);
        assert_eq!(metric.category.as_deref(), Some("SUPPORT"));
        assert_eq!(metric.tags.get("model").map(String::as_str), Some("gpt-4"));
    }
}
