//! Caller-side retry for lost claim races.

use std::time::Duration;

use dataaccess_core::Job;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AccessError, AccessResult};
use crate::jobs::ClaimJob;
use crate::scope::Scope;

/// Backoff strategy between claim attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between attempts
    Fixed,
    /// base * 2^(attempt-1)
    #[default]
    Exponential,
    /// base * attempt
    Linear,
}

/// How hard to retry a claim that lost a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRetryPolicy {
    /// Total claim attempts per round, including the first. 0 behaves as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Each delay is drawn uniformly from `delay * (1 ± jitter)`, clamped to
    /// 0.0-1.0. Workers that lost the same race then retry at different times.
    pub jitter: f64,
}

impl Default for ClaimRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl ClaimRetryPolicy {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Backoff after the `attempt`-th failed attempt (1-indexed), before
    /// jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 1_u32 << attempt.saturating_sub(1).min(30);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };
        delay.min(self.max_delay)
    }

    /// [`delay_for_attempt`](Self::delay_for_attempt) spread by `jitter`, using
    /// the caller's random source.
    pub fn jittered_delay<R>(&self, attempt: u32, rng: &mut R) -> Duration
    where
        R: Rng + ?Sized,
    {
        let delay = self.delay_for_attempt(attempt);
        let factor = self.jitter.clamp(0.0, 1.0);
        if factor.is_nan() || factor <= 0.0 {
            return delay;
        }
        let spread = delay.mul_f64(factor);

        let low = delay.saturating_sub(spread).as_micros() as u64;
        let high = (delay + spread).as_micros() as u64;
        Duration::from_micros(rng.random_range(low..=high))
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }
}

/// Claim a job, retrying lost races.
///
/// `NoEligibleJob` and every non-conflict error return immediately. When all
/// attempts conflict the round is reported as `NoEligibleJob`: the jobs that
/// were eligible went to other workers.
pub async fn claim_with_retry<C>(
    claimer: &C,
    scope: &Scope,
    policy: &ClaimRetryPolicy,
) -> AccessResult<Job>
where
    C: ClaimJob + ?Sized,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match claimer.claim(scope).await {
            Err(AccessError::Conflict(reason)) if policy.should_retry(attempts) => {
                let delay = policy.jittered_delay(attempts, &mut rand::rng());
                debug!(attempts, ?delay, %reason, "claim conflicted, retrying");
                scope.sleep(delay).await?;
            }
            Err(AccessError::Conflict(reason)) => {
                debug!(attempts, %reason, "claim conflicted on every attempt");
                return Err(AccessError::NoEligibleJob);
            }
            other => return other,
        }
    }
}
