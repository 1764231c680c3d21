//! Global sliding-window rate limiting.
//!
//! A single process-wide window bounds the number of accepted webhook requests
//! per unit time, independent of the event content or the caller. This is a
//! backpressure policy protecting the paid generation service downstream.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Sliding window parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum accepted requests inside one window
    pub max_requests: usize,

    /// Length of the trailing window
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window counter over accepted request timestamps.
///
/// Invariants:
/// - every retained timestamp `t` satisfies `now - t <= window` after eviction
/// - the number of retained timestamps never exceeds `max_requests`
/// - rejected attempts are never recorded
///
/// # Examples
///
/// ```rust
/// use cast_responder_core::rate_limit::{RateLimitConfig, SlidingWindowRateLimiter};
/// use std::time::{Duration, Instant};
///
/// let limiter = SlidingWindowRateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(60)));
/// let now = Instant::now();
///
/// assert!(limiter.try_acquire(now));
/// assert!(limiter.try_acquire(now));
/// assert!(!limiter.try_acquire(now));
/// assert!(limiter.try_acquire(now + Duration::from_secs(61)));
/// ```
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    config: RateLimitConfig,
    window: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowRateLimiter {
    /// Create a limiter with an empty window
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(VecDeque::with_capacity(config.max_requests)),
        }
    }

    /// Get the limiter configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit and record a request at `now`, or reject it without recording.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut window = self.lock();
        self.evict_expired(&mut window, now);

        if window.len() >= self.config.max_requests {
            debug!(
                in_window = window.len(),
                max_requests = self.config.max_requests,
                "Rate limit window full"
            );
            return false;
        }

        window.push_back(now);
        true
    }

    /// Whether a request at `now` would currently be admitted.
    ///
    /// Does not record anything and does not evict, so it is safe to call for
    /// requests that have not been authenticated yet.
    pub fn would_admit(&self, now: Instant) -> bool {
        let window = self.lock();
        let live = window
            .iter()
            .filter(|stamp| !self.is_expired(**stamp, now))
            .count();
        live < self.config.max_requests
    }

    /// Time until the oldest live slot leaves the window.
    ///
    /// Returns [`Duration::ZERO`] when a slot is available now.
    pub fn retry_after(&self, now: Instant) -> Duration {
        let window = self.lock();
        let live: Vec<Instant> = window
            .iter()
            .copied()
            .filter(|stamp| !self.is_expired(*stamp, now))
            .collect();

        if live.len() < self.config.max_requests {
            return Duration::ZERO;
        }

        live.into_iter()
            .min()
            .map(|oldest| {
                let age = now.saturating_duration_since(oldest);
                self.config.window.saturating_sub(age) + Duration::from_nanos(1)
            })
            .unwrap_or(Duration::ZERO)
    }

    /// Number of recorded requests still inside the window at `now`.
    pub fn current_count(&self, now: Instant) -> usize {
        let window = self.lock();
        window
            .iter()
            .filter(|stamp| !self.is_expired(**stamp, now))
            .count()
    }

    fn evict_expired(&self, window: &mut VecDeque<Instant>, now: Instant) {
        // Stamps may be recorded slightly out of order.
        window.retain(|stamp| !self.is_expired(*stamp, now));
    }

    fn is_expired(&self, stamp: Instant, now: Instant) -> bool {
        now.saturating_duration_since(stamp) > self.config.window
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
