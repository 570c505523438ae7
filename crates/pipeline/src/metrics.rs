use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// In-process pipeline counters, exposed by the health endpoint.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    cycles: AtomicU64,
    emails_fetched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    auto_replies: AtomicU64,
    drafts: AtomicU64,
    manual_reviews: AtomicU64,
    escalations: AtomicU64,
    duplicates_skipped: AtomicU64,
    rate_limit_deferrals: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineMetricsSnapshot {
    pub cycles: u64,
    pub emails_fetched: u64,
    pub completed: u64,
    pub failed: u64,
    pub auto_replies: u64,
    pub drafts: u64,
    pub manual_reviews: u64,
    pub escalations: u64,
    pub duplicates_skipped: u64,
    pub rate_limit_deferrals: u64,
}

impl PipelineMetrics {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched(&self, count: u64) {
        self.emails_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_reply(&self) {
        self.auto_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_draft(&self) {
        self.drafts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_manual_review(&self) {
        self.manual_reviews.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_deferral(&self) {
        self.rate_limit_deferrals.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            emails_fetched: self.emails_fetched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            auto_replies: self.auto_replies.load(Ordering::Relaxed),
            drafts: self.drafts.load(Ordering::Relaxed),
            manual_reviews: self.manual_reviews.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            rate_limit_deferrals: self.rate_limit_deferrals.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_cycle();
        metrics.record_fetched(3);
        metrics.record_completed();
        metrics.record_completed();
        metrics.record_failed();
        metrics.record_auto_reply();

        let snap = metrics.snapshot();
        assert_eq!(snap.cycles, 1);
        assert_eq!(snap.emails_fetched, 3);
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.auto_replies, 1);
        assert_eq!(snap.drafts, 0);
    }
}
