//! Exponential backoff retry policy for failed deliveries.
//!
//! Delay grows as `base_delay * 2^retry_count`, capped at `max_delay`, with
//! optional jitter for load distribution. Dueness is anchored to the item's
//! enqueue time rather than the last failure, so a restart never extends an
//! item's wait beyond its computed schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use faultline_core::Settings;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adapter::SendError;

/// Retry policy configuration for error delivery.
///
/// `max_retries` bounds the number of retries after the initial attempt, so
/// an item is attempted at most `max_retries + 1` times before it is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff calculation.
    pub base_delay: Duration,

    /// Maximum delay between retry attempts.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0) to add randomness. Disabled by default
    /// so retry schedules stay deterministic unless opted into.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from persisted runtime settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_factor: 0.0,
        }
    }

    /// Calculates the backoff delay for an item with the given failure count.
    ///
    /// `retry_count` is the number of attempts that have already failed; a
    /// fresh item (count 0) is due immediately.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }

        let exponent = retry_count.min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let base = self.base_delay.saturating_mul(multiplier);
        let capped = std::cmp::min(base, self.max_delay);

        let jittered = apply_jitter(capped, self.jitter_factor);
        std::cmp::min(jittered, self.max_delay)
    }

    /// Earliest time an item with the given failure count may be attempted.
    ///
    /// Anchored to the item's enqueue time, not the failure time, so the
    /// schedule survives process restarts unchanged.
    pub fn next_attempt_at(&self, created_at: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        let delay = self.backoff_delay(retry_count);
        match chrono::Duration::from_std(delay) {
            Ok(chrono_delay) => created_at + chrono_delay,
            Err(_) => DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Whether an item with the given failure count is due at `now`.
    pub fn is_due(&self, created_at: DateTime<Utc>, retry_count: u32, now: DateTime<Utc>) -> bool {
        now >= self.next_attempt_at(created_at, retry_count)
    }

    /// Decides the fate of an item whose attempt just failed.
    ///
    /// `retry_count` is the item's failure count after recording this
    /// failure. Non-retryable errors and exhausted retry budgets give up;
    /// rate limits reschedule from the failure time using the backend's
    /// guidance instead of the computed backoff.
    pub fn decide(
        &self,
        error: &SendError,
        retry_count: u32,
        created_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    ) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp { reason: format!("non-retryable error: {error}") };
        }

        if retry_count > self.max_retries {
            return RetryDecision::GiveUp {
                reason: format!("retry budget ({}) exhausted", self.max_retries),
            };
        }

        let next_attempt_at = match error.retry_after_seconds() {
            Some(seconds) => failed_at + chrono::Duration::seconds(seconds.min(86_400) as i64),
            None => self.next_attempt_at(created_at, retry_count),
        };

        RetryDecision::Retry { next_attempt_at }
    }
}

/// Result of a retry decision for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the delivery at the specified time.
    Retry {
        /// When the next delivery attempt should be made.
        next_attempt_at: DateTime<Utc>,
    },
    /// Do not retry. The item is dropped.
    GiveUp {
        /// Reason why the delivery should not be retried.
        reason: String,
    },
}

/// Applies jitter to a duration to prevent thundering herd effects.
///
/// Randomizes the delay by ±jitter_factor percentage. For example, with
/// jitter_factor=0.25, a 10s delay becomes 7.5s to 12.5s randomly.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}
