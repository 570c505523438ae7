use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Rolled-up processing outcomes over a trailing window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStatistics {
    /// Window length in days.
    pub window_days: u32,
    /// Attempts recorded inside the window.
    pub total: u64,
    /// Attempts that reached `Completed`.
    pub completed: u64,
    /// Attempts that reached `Failed`.
    pub failed: u64,
    /// Replies actually sent.
    pub auto_replies_sent: u64,
    /// Drafts stored for review.
    pub drafts_created: u64,
    /// Escalation groups created.
    pub escalations_created: u64,
    /// Messages flagged for manual review.
    pub manual_reviews: u64,
    /// Mean end-to-end processing time.
    pub avg_processing_ms: f64,
}

/// Per-category classification count with mean confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
    pub avg_confidence: f64,
}

/// Rolled-up classification quality numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationStatistics {
    /// Classifications stored.
    pub total: u64,
    /// Counts per category.
    pub by_category: Vec<CategoryCount>,
    /// Mean confidence across all classifications.
    pub avg_confidence: f64,
    /// Reviewer feedback tallies.
    pub feedback_correct: u64,
    pub feedback_incorrect: u64,
    pub feedback_partial: u64,
}

/// One aggregated metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub kind: String,
    pub name: String,
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Aggregated metrics over a trailing window, optionally filtered by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub window_days: u32,
    pub kind: Option<String>,
    pub series: Vec<MetricAggregate>,
}

/// Point-in-time dashboard counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Emails ever observed.
    pub total_emails: u64,
    /// Emails received in the last 24 hours.
    pub emails_last_24h: u64,
    /// Emails not yet in a terminal state.
    pub unprocessed: u64,
    /// Escalation groups currently active.
    pub active_escalations: u64,
    /// Processing outcomes over the last 7 days.
    pub processing_7d: ProcessingStatistics,
    /// Classification counts per category, all time.
    pub category_counts: HashMap<String, u64>,
    /// Patterns worth automating (frequency >= 5, potential >= 50).
    pub automation_candidates: u64,
}
