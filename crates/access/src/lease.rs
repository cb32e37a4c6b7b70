//! Lease policy.
//!
//! Decides which jobs may be claimed and what claiming or releasing one does
//! to its record. The policy is pure: it never touches the store and takes the
//! current time as an argument, so the same instant drives both the
//! client-side predicate and the server-side filter.
//!
//! A job is eligible when it is idle, has no stored state, or holds a lease
//! whose expiration is strictly before `now`. Time is truncated to whole
//! milliseconds first, the resolution at which expirations are stored.

use chrono::{DateTime, SubsecRound, Utc};
use dataaccess_core::{Job, JobState, StateTag};
use dataaccess_store::Filter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AccessError, AccessResult};

pub mod fields {
    pub const NAME: &str = "name";
    pub const STATE: &str = "state";
    pub const EXPIRATION: &str = "expiration";
    pub const VERSION: &str = "version";
}

pub const DEFAULT_LEASE_SECS: u64 = 30 * 60;

/// Lease configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// How long a claim is honoured before the job counts as abandoned.
    pub lease_duration_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: DEFAULT_LEASE_SECS,
        }
    }
}

impl LeaseConfig {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            lease_duration_secs: secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    duration: chrono::Duration,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            duration: chrono::Duration::seconds(DEFAULT_LEASE_SECS as i64),
        }
    }
}

impl LeasePolicy {
    pub fn new(config: LeaseConfig) -> AccessResult<Self> {
        if config.lease_duration_secs == 0 {
            return Err(AccessError::Validation(
                "lease duration must be positive".to_string(),
            ));
        }
        let secs = i64::try_from(config.lease_duration_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                AccessError::Validation(format!(
                    "lease duration of {}s is out of range",
                    config.lease_duration_secs
                ))
            })?;
        Ok(Self { duration: secs })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.duration
    }

    /// Idle, or leased with a deadline strictly before `now` at millisecond
    /// resolution.
    pub fn is_eligible(&self, job: &Job, now: DateTime<Utc>) -> bool {
        job.state.is_idle() || job.state.is_lapsed(now.trunc_subsecs(3))
    }

    /// Store-side form of [`is_eligible`](Self::is_eligible).
    pub fn eligibility_filter(&self, now: DateTime<Utc>) -> Filter {
        let now_ms = now.trunc_subsecs(3).timestamp_millis();
        Filter::or([
            Filter::missing(fields::STATE),
            // An explicit null decodes to idle as well.
            Filter::eq(fields::STATE, Value::Null),
            Filter::eq(fields::STATE, StateTag::Idle.as_str()),
            Filter::and([
                Filter::eq(fields::STATE, StateTag::InProgress.as_str()),
                Filter::lt(fields::EXPIRATION, now_ms),
            ]),
        ])
    }

    /// The record after `job` is claimed at `now`.
    pub fn claim(&self, job: &Job, now: DateTime<Utc>) -> AccessResult<Job> {
        if !self.is_eligible(job, now) {
            return Err(AccessError::Conflict(format!(
                "job '{}' is leased until {:?}",
                job.name,
                job.state.expiration()
            )));
        }

        let expiration = now.trunc_subsecs(3) + self.duration;
        Ok(Job {
            state: JobState::InProgress { expiration },
            version: job.version + 1,
            ..job.clone()
        })
    }

    /// The record after `job` is released.
    pub fn release(&self, job: &Job) -> Job {
        Job {
            state: JobState::Idle,
            version: job.version + 1,
            ..job.clone()
        }
    }
}

/// Matches documents still at `version`. Version 0 also matches documents
/// written without the field.
pub(crate) fn version_guard(version: u64) -> Filter {
    if version == 0 {
        Filter::or([Filter::eq(fields::VERSION, 0), Filter::missing(fields::VERSION)])
    } else {
        Filter::eq(fields::VERSION, version)
    }
}
