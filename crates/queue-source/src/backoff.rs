//! # Backoff Policy Module
//!
//! Decides how long the poll loop waits after an empty receive (idle tick)
//! and after a failed receive.
//!
//! By default both waits are the configured polling interval. An optional
//! [`ErrorBackoff`] escalates the wait exponentially, with jitter, while
//! receive calls keep failing, and falls back to the idle interval once a
//! receive succeeds again.

use rand::Rng;
use std::time::Duration;

/// Wait policy applied between receive calls
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    idle_interval: Duration,
    error_backoff: Option<ErrorBackoff>,
}

impl BackoffPolicy {
    /// Create a policy that waits `idle_interval` after empty and failed receives
    pub fn new(idle_interval: Duration) -> Self {
        Self {
            idle_interval,
            error_backoff: None,
        }
    }

    /// Escalate the wait after consecutive receive failures
    pub fn with_error_backoff(mut self, error_backoff: ErrorBackoff) -> Self {
        self.error_backoff = Some(error_backoff);
        self
    }

    /// Wait after a receive that returned no messages
    pub fn idle_delay(&self) -> Duration {
        self.idle_interval
    }

    /// Wait after the receive failure recorded in `streak`.
    ///
    /// Never shorter than the idle interval.
    pub fn error_delay(&self, streak: &FailureStreak) -> Duration {
        match &self.error_backoff {
            Some(backoff) if streak.consecutive() > 0 => backoff
                .calculate_delay(streak.consecutive() - 1)
                .max(self.idle_interval),
            _ => self.idle_interval,
        }
    }

    pub fn error_backoff(&self) -> Option<&ErrorBackoff> {
        self.error_backoff.as_ref()
    }
}

/// Exponential backoff configuration for repeated receive failures
///
/// # Examples
///
/// ```rust
/// use queue_source::backoff::ErrorBackoff;
/// use std::time::Duration;
///
/// let backoff = ErrorBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 2.0)
///     .without_jitter();
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_secs(1));
/// assert_eq!(backoff.calculate_delay(3), Duration::from_secs(8));
/// assert_eq!(backoff.calculate_delay(10), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBackoff {
    /// Delay after the first failure
    pub initial_delay: Duration,

    /// Maximum delay between receive attempts
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl ErrorBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self.use_jitter = self.jitter_percent > 0.0;
        self
    }

    /// Calculate delay for a specific failure (0-based).
    ///
    /// Uses `initial * multiplier^attempt`, capped at `max_delay`, then
    /// applies jitter when enabled.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let capped_delay_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::try_from_secs_f64(final_delay_secs).unwrap_or(Duration::MAX)
    }

    /// Applies random variation in range [delay * (1-jitter), delay * (1+jitter)]
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);

        (delay_secs + jitter).max(0.0)
    }
}

/// Tracks consecutive receive failures for the error backoff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureStreak {
    consecutive: u32,
}

impl FailureStreak {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more failed receive
    pub fn record_failure(&mut self) {
        self.consecutive = self.consecutive.saturating_add(1);
    }

    /// Forget previous failures after a successful receive
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
