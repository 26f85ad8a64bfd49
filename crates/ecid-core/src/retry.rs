//! Retry scheduling
//!
//! The scheduler owns a single optional delay and nothing else: attempt
//! counting stays with the caller, passed explicitly on each resubmission.
//! That separation keeps the scheduler reusable and testable independent of
//! any retry-count policy.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

/// Delay range (seconds) for the jittered production scheduler. One delay is
/// drawn per scheduler instance, not per attempt, to spread load from many
/// concurrent clients retrying at once.
pub const DEFAULT_JITTER_RANGE_SECS: RangeInclusive<f64> = 10.0..=30.0;

/// Schedules retry submissions after an optional fixed delay
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    delay: Option<Duration>,
}

impl RetryScheduler {
    /// Scheduler that resubmits without any delay (tests, interactive hosts)
    pub fn immediate() -> Self {
        Self { delay: None }
    }

    /// Scheduler with a fixed delay between submissions
    pub fn fixed(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    /// Scheduler with one randomized delay drawn from `range` at
    /// construction. The draw happens once and is reused for every
    /// submission over the scheduler's lifetime.
    pub fn jittered(range: RangeInclusive<f64>) -> Self {
        let secs = rand::rng().random_range(range);
        Self {
            delay: Some(Duration::from_secs_f64(secs)),
        }
    }

    /// The configured delay, if any
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Suspend until the next attempt should run: sleeps the configured
    /// delay, or yields once when none is set. Never blocks a thread.
    pub async fn pause(&self) {
        match self.delay {
            Some(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
            _ => tokio::task::yield_now().await,
        }
    }
}
