//! # Retry Policy Module
//!
//! Exponential backoff for outbound calls to Neynar and the reply generator.
//!
//! Only failures that [`DownstreamError::is_transient`] reports as transient
//! are retried. Delays carry jitter so a burst of failed calls does not
//! retry in lockstep.

use cast_responder_core::DownstreamError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy configuration for exponential backoff
///
/// # Examples
///
/// ```rust
/// use cast_responder_service::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Default policy: 2 retries, 250ms initial, 2s max, 2.0x multiplier
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.total_attempts(), 3);
///
/// let policy = RetryPolicy::new(4, Duration::from_millis(100), Duration::from_secs(1), 1.5);
/// assert!(policy.should_retry(3));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Exponential growth factor
    pub backoff_multiplier: f64,

    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with ±25% jitter
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Default backoff with a specific retry budget
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::with_max_retries(0)
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (clamped to 0.0..=1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `retry` (0-based)
    ///
    /// `initial * multiplier^retry`, capped at `max_delay`, then jittered.
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let base_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(retry as i32);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.use_jitter {
            Self::add_jitter(capped_secs, self.jitter_percent)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    /// Whether retry number `retry` (0-based) is within budget
    pub fn should_retry(&self, retry: u32) -> bool {
        retry < self.max_retries
    }

    /// Total attempts including the first
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the retry budget
/// is spent
///
/// The last error is returned when every attempt fails.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, DownstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DownstreamError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && policy.should_retry(retry) => {
                let delay = policy.calculate_delay(retry);
                warn!(
                    operation = operation_name,
                    service = e.service(),
                    error = %e,
                    attempt = retry + 1,
                    max_attempts = policy.total_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
