//! Per-identifier request admission.
//!
//! Admission keeps an ordered set of request timestamps per identifier
//! (typically `email_processing`, `llm`, or a caller address). A request is
//! admitted when fewer than `max_requests` fall inside the sliding window;
//! hitting the limit places the identifier in a cooldown for one full window.
//! A secondary 10-second burst window rejects short spikes, and an optional
//! adaptive factor scales the limit down under load.

mod limiter;

pub use limiter::{
    AdaptiveRateLimiter, Decision, LimiterStatistics, RateLimitConfig, SlidingWindowLimiter,
};
