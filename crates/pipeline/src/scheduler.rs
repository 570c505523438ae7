use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::orchestrator::{CycleSummary, Orchestrator};

/// Runs considered by the trailing error-rate check.
const HEALTH_WINDOW: usize = 20;

/// Scheduler status exposed by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub error_count: u64,
    pub uptime_seconds: i64,
}

/// Health verdict derived from the status.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
    pub healthy: bool,
    pub reasons: Vec<String>,
    pub status: SchedulerStatus,
}

#[derive(Debug)]
struct RunStats {
    started_at: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    run_count: u64,
    error_count: u64,
    recent: VecDeque<bool>,
    running: bool,
}

impl RunStats {
    fn new() -> Self {
        Self {
            started_at: None,
            last_run: None,
            last_success: None,
            next_run: None,
            run_count: 0,
            error_count: 0,
            recent: VecDeque::with_capacity(HEALTH_WINDOW),
            running: false,
        }
    }

    fn record(&mut self, ok: bool) {
        self.run_count += 1;
        self.last_run = Some(Utc::now());
        if ok {
            self.last_success = self.last_run;
        } else {
            self.error_count += 1;
        }
        if self.recent.len() == HEALTH_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(ok);
    }
}

/// Periodic driver for the orchestrator.
///
/// Single-flight: at most one cycle runs at a time. Overlapping interval
/// wakeups and manual triggers that land while a cycle is in progress are
/// dropped and logged. Shutdown is graceful — the in-flight cycle finishes
/// before the loop exits.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    cycle_lock: tokio::sync::Mutex<()>,
    stats: Mutex<RunStats>,
}

impl Scheduler {
    /// Create a scheduler ticking every `interval`.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            cycle_lock: tokio::sync::Mutex::new(()),
            stats: Mutex::new(RunStats::new()),
        }
    }

    /// Run the periodic loop until a shutdown message arrives. The first
    /// tick fires after one full interval.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        {
            let mut stats = self.lock_stats();
            stats.started_at = Some(Utc::now());
            stats.running = true;
            stats.next_run = Some(Utc::now() + self.interval_delta());
        }
        info!(interval_secs = self.interval.as_secs(), "scheduler started");

        let mut timer = tokio::time::interval(self.interval);
        // The immediate first tick would race startup; skip it.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_guarded_cycle("interval").await;
                    let mut stats = self.lock_stats();
                    stats.next_run = Some(Utc::now() + self.interval_delta());
                }
                _ = shutdown_rx.recv() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }

        // Wait for any in-flight cycle before reporting stopped.
        let _guard = self.cycle_lock.lock().await;
        self.lock_stats().running = false;
        info!("scheduler stopped");
    }

    /// Run one cycle now, honoring the single-flight guard. Returns `None`
    /// when another cycle is already in progress.
    pub async fn trigger_immediate(&self) -> Option<CycleSummary> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("manual trigger dropped, cycle already in progress");
            return None;
        };
        Some(self.run_cycle().await)
    }

    async fn run_guarded_cycle(&self, source: &str) {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!(source, "overlapping wakeup dropped, cycle still in progress");
            return;
        };
        self.run_cycle().await;
    }

    async fn run_cycle(&self) -> CycleSummary {
        let summary = self.orchestrator.process_cycle().await;
        let ok = summary.errors.is_empty();
        self.lock_stats().record(ok);
        summary
    }

    /// Current status counters.
    pub fn status(&self) -> SchedulerStatus {
        let stats = self.lock_stats();
        let uptime_seconds = stats
            .started_at
            .map_or(0, |t| (Utc::now() - t).num_seconds());
        SchedulerStatus {
            running: stats.running,
            interval_minutes: self.interval.as_secs() / 60,
            last_run: stats.last_run,
            next_run: stats.next_run,
            run_count: stats.run_count,
            error_count: stats.error_count,
            uptime_seconds,
        }
    }

    /// Health verdict: unhealthy when no successful run landed within two
    /// intervals, or when more than half of the last twenty runs failed.
    pub fn health(&self) -> SchedulerHealth {
        let status = self.status();
        let mut reasons = Vec::new();

        {
            let stats = self.lock_stats();

            if stats.running {
                let reference = stats.last_success.or(stats.started_at);
                if let Some(reference) = reference {
                    let stale_after = chrono::Duration::from_std(self.interval * 2)
                        .unwrap_or_else(|_| chrono::Duration::minutes(10));
                    if Utc::now() - reference > stale_after {
                        reasons.push(format!(
                            "no successful run since {reference} (> 2 intervals)"
                        ));
                    }
                }
            } else {
                reasons.push("scheduler is not running".to_owned());
            }

            if stats.recent.len() >= 2 {
                let failures = stats.recent.iter().filter(|ok| !**ok).count();
                if failures * 2 > stats.recent.len() {
                    reasons.push(format!(
                        "error rate {failures}/{} over recent runs",
                        stats.recent.len()
                    ));
                }
            }
        }

        SchedulerHealth {
            healthy: reasons.is_empty(),
            reasons,
            status,
        }
    }

    fn interval_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, RunStats> {
        self.stats.lock().expect("scheduler stats lock poisoned")
    }
}
