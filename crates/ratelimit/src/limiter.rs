use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

/// Limits applied to each identifier.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per sliding window.
    pub max_requests: usize,
    /// Sliding window length.
    pub window: Duration,
    /// Maximum requests inside the short burst window.
    pub burst_max: usize,
    /// Burst window length.
    pub burst_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            burst_max: 20,
            burst_window: Duration::from_secs(10),
        }
    }
}

impl RateLimitConfig {
    /// Create a config with the given window limit, keeping burst defaults.
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            ..Self::default()
        }
    }
}

/// Outcome of an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request was admitted and recorded.
    Allowed {
        /// Requests remaining in the window after this one.
        remaining: usize,
    },
    /// The identifier exhausted its window and entered a cooldown.
    Denied {
        /// Seconds until the cooldown ends.
        retry_after_secs: u64,
    },
    /// The identifier exceeded the short-term burst limit.
    BurstDenied {
        /// Seconds until the burst window drains.
        retry_after_secs: u64,
    },
}

impl Decision {
    /// Whether the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Aggregate counters across all identifiers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LimiterStatistics {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub denied_requests: u64,
    pub active_identifiers: usize,
    pub blocked_identifiers: usize,
}

#[derive(Debug, Default)]
struct Window {
    timestamps: VecDeque<Instant>,
    burst_timestamps: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration, burst_window: Duration) {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        while let Some(&front) = self.burst_timestamps.front() {
            if now.duration_since(front) >= burst_window {
                self.burst_timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window rate limiter over in-process state.
///
/// Windows are mutated under a per-identifier lock; the map itself is
/// sharded, so distinct identifiers do not contend.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Mutex<Window>>,
    total: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            total: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }

    /// Request admission for `identifier`, applying `effective_max` as the
    /// window limit. Used by the adaptive wrapper; plain callers go through
    /// [`check`](Self::check).
    fn check_with_limit(&self, identifier: &str, effective_max: usize) -> Decision {
        let now = Instant::now();
        self.total.fetch_add(1, Ordering::Relaxed);

        let entry = self
            .windows
            .entry(identifier.to_owned())
            .or_insert_with(|| Mutex::new(Window::default()));
        let mut window = entry.lock().expect("rate limit window lock poisoned");

        // Cooldown from a previous trip still active?
        if let Some(blocked_until) = window.blocked_until {
            if now < blocked_until {
                self.denied.fetch_add(1, Ordering::Relaxed);
                let retry_after_secs = (blocked_until - now).as_secs().max(1);
                debug!(identifier, retry_after_secs, "request denied, in cooldown");
                return Decision::Denied { retry_after_secs };
            }
            window.blocked_until = None;
        }

        window.prune(now, self.config.window, self.config.burst_window);

        if window.timestamps.len() >= effective_max {
            // Trip: one full window of cooldown.
            window.blocked_until = Some(now + self.config.window);
            self.denied.fetch_add(1, Ordering::Relaxed);
            warn!(
                identifier,
                requests = window.timestamps.len(),
                window_secs = self.config.window.as_secs(),
                "rate limit exceeded, identifier placed in cooldown"
            );
            return Decision::Denied {
                retry_after_secs: self.config.window.as_secs().max(1),
            };
        }

        if window.burst_timestamps.len() >= self.config.burst_max {
            self.denied.fetch_add(1, Ordering::Relaxed);
            let retry_after_secs = window
                .burst_timestamps
                .front()
                .map(|&f| {
                    self.config
                        .burst_window
                        .saturating_sub(now.duration_since(f))
                        .as_secs()
                })
                .unwrap_or(1)
                .max(1);
            warn!(identifier, "burst limit exceeded");
            return Decision::BurstDenied { retry_after_secs };
        }

        window.timestamps.push_back(now);
        window.burst_timestamps.push_back(now);
        self.allowed.fetch_add(1, Ordering::Relaxed);

        Decision::Allowed {
            remaining: effective_max - window.timestamps.len(),
        }
    }

    /// Request admission for `identifier`.
    pub fn check(&self, identifier: &str) -> Decision {
        self.check_with_limit(identifier, self.config.max_requests)
    }

    /// Remaining capacity for `identifier` without recording a request.
    pub fn remaining(&self, identifier: &str) -> usize {
        let now = Instant::now();
        match self.windows.get(identifier) {
            Some(entry) => {
                let mut window = entry.lock().expect("rate limit window lock poisoned");
                if window.blocked_until.is_some_and(|t| now < t) {
                    return 0;
                }
                window.prune(now, self.config.window, self.config.burst_window);
                self.config.max_requests.saturating_sub(window.timestamps.len())
            }
            None => self.config.max_requests,
        }
    }

    /// Clear all state for `identifier` (admin operation).
    pub fn reset(&self, identifier: &str) -> bool {
        self.windows.remove(identifier).is_some()
    }

    /// Aggregate counters across all identifiers.
    pub fn statistics(&self) -> LimiterStatistics {
        let now = Instant::now();
        let mut active = 0;
        let mut blocked = 0;
        for entry in &self.windows {
            let window = entry.lock().expect("rate limit window lock poisoned");
            if window.blocked_until.is_some_and(|t| now < t) {
                blocked += 1;
            } else if !window.timestamps.is_empty() {
                active += 1;
            }
        }
        LimiterStatistics {
            total_requests: self.total.load(Ordering::Relaxed),
            allowed_requests: self.allowed.load(Ordering::Relaxed),
            denied_requests: self.denied.load(Ordering::Relaxed),
            active_identifiers: active,
            blocked_identifiers: blocked,
        }
    }

    /// Total requests currently inside any identifier's window.
    fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.windows
            .iter()
            .map(|entry| {
                let mut window = entry.lock().expect("rate limit window lock poisoned");
                window.prune(now, self.config.window, self.config.burst_window);
                window.timestamps.len()
            })
            .sum()
    }

    /// The configured (unscaled) window limit.
    #[must_use]
    pub fn max_requests(&self) -> usize {
        self.config.max_requests
    }
}

/// Wraps a [`SlidingWindowLimiter`] and scales its limit by a load factor in
/// {0.5, 0.75, 1.0} derived from the total active-request count. The factor
/// is recomputed at most once per minute.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    inner: SlidingWindowLimiter,
    base_max_requests: usize,
    // Load factor in hundredths (50, 75 or 100) so it fits in an atomic.
    load_factor_pct: AtomicU64,
    last_recompute: Mutex<Option<Instant>>,
    recompute_interval: Duration,
}

impl AdaptiveRateLimiter {
    /// Create an adaptive limiter with the given base configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let base_max_requests = config.max_requests;
        Self {
            inner: SlidingWindowLimiter::new(config),
            base_max_requests,
            load_factor_pct: AtomicU64::new(100),
            last_recompute: Mutex::new(None),
            recompute_interval: Duration::from_secs(60),
        }
    }

    /// Request admission for `identifier` with the load-scaled limit.
    pub fn check(&self, identifier: &str) -> Decision {
        self.maybe_recompute_load();
        let factor = self.load_factor_pct.load(Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        let effective = ((self.base_max_requests as u64 * factor) / 100).max(1) as usize;
        self.inner.check_with_limit(identifier, effective)
    }

    /// Current load factor as a fraction (0.5, 0.75 or 1.0).
    #[allow(clippy::cast_precision_loss)]
    pub fn load_factor(&self) -> f64 {
        self.load_factor_pct.load(Ordering::Relaxed) as f64 / 100.0
    }

    /// Aggregate counters from the wrapped limiter.
    pub fn statistics(&self) -> LimiterStatistics {
        self.inner.statistics()
    }

    fn maybe_recompute_load(&self) {
        let mut last = self
            .last_recompute
            .lock()
            .expect("adaptive limiter lock poisoned");
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < self.recompute_interval) {
            return;
        }
        *last = Some(now);
        drop(last);

        let in_flight = self.inner.in_flight();
        let factor = if in_flight > self.base_max_requests * 2 {
            50
        } else if in_flight > self.base_max_requests {
            75
        } else {
            100
        };
        self.load_factor_pct.store(factor, Ordering::Relaxed);
        debug!(in_flight, factor_pct = factor, "recomputed adaptive load factor");
    }

    #[cfg(test)]
    fn force_recompute_interval(&mut self, interval: Duration) {
        self.recompute_interval = interval;
    }
}
