//! Job model and its lease state.
//!
//! A job is a unit of work pulled by workers from the shared store. The only
//! part of a job the data-access layer interprets is its lease state; every
//! other field is carried as an opaque payload.
//!
//! ## States
//!
//! - `Idle`: nobody holds the job. Stored documents without a `state` field
//!   decode to this variant.
//! - `InProgress { expiration }`: a worker holds a lease until `expiration`.
//!   Once the expiration passes the job is claimable again even though the
//!   stored state still reads `in_progress`.
//!
//! ## Wire form
//!
//! [`JobRecord`] is the document shape (`name`, `state`, `expiration`,
//! `version`, payload fields flattened at the top level). Decoding a record
//! into a [`Job`] is the single boundary where unknown or inconsistent states
//! are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::name::JobName;

/// Field names owned by the data-access layer; payloads must not use them.
pub const RESERVED_FIELDS: [&str; 4] = ["name", "state", "expiration", "version"];

/// Stored representation of the lease state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    Idle,
    InProgress,
}

impl StateTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateTag::Idle => "idle",
            StateTag::InProgress => "in_progress",
        }
    }
}

impl std::fmt::Display for StateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lease state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    /// Not held by any worker.
    #[default]
    Idle,
    /// Held by a worker until `expiration`.
    InProgress { expiration: DateTime<Utc> },
}

impl JobState {
    pub fn tag(&self) -> StateTag {
        match self {
            JobState::Idle => StateTag::Idle,
            JobState::InProgress { .. } => StateTag::InProgress,
        }
    }

    /// Lease deadline, only defined while in progress.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        match self {
            JobState::Idle => None,
            JobState::InProgress { expiration } => Some(*expiration),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, JobState::Idle)
    }

    /// True when a lease exists and its deadline is strictly before `now`.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        match self {
            JobState::Idle => false,
            JobState::InProgress { expiration } => *expiration < now,
        }
    }
}

/// A job record.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Unique, immutable key.
    pub name: JobName,
    /// Lease state.
    pub state: JobState,
    /// Optimistic concurrency token, bumped by every write.
    pub version: u64,
    /// Producer-defined fields, opaque to the lease protocol.
    pub payload: Map<String, Value>,
}

impl Job {
    /// Create a new idle job.
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        Ok(Self {
            name: JobName::new(name)?,
            state: JobState::Idle,
            version: 0,
            payload: Map::new(),
        })
    }

    /// Replace the payload.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Add a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn is_in_progress(&self) -> bool {
        !self.state.is_idle()
    }

    /// Reject jobs that cannot be persisted as-is.
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(key) = self
            .payload
            .keys()
            .find(|k| RESERVED_FIELDS.contains(&k.as_str()))
        {
            return Err(DomainError::validation(format!(
                "payload field '{key}' collides with a reserved job field"
            )));
        }
        Ok(())
    }
}

impl Entity for Job {
    type Id = JobName;
    const COLLECTION: &'static str = "job";

    fn id(&self) -> &Self::Id {
        &self.name
    }
}

/// Document shape of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: JobName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateTag>,

    /// Epoch milliseconds, so stores compare deadlines numerically.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expiration: Option<DateTime<Utc>>,

    #[serde(default)]
    pub version: u64,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            name: job.name.clone(),
            state: Some(job.state.tag()),
            expiration: job.state.expiration(),
            version: job.version,
            payload: job.payload.clone(),
        }
    }
}

impl TryFrom<JobRecord> for Job {
    type Error = DomainError;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        let state = match (record.state, record.expiration) {
            // A stale expiration on an idle job is ignored.
            (None, _) | (Some(StateTag::Idle), _) => JobState::Idle,
            (Some(StateTag::InProgress), Some(expiration)) => JobState::InProgress { expiration },
            (Some(StateTag::InProgress), None) => {
                return Err(DomainError::invariant(format!(
                    "job '{}' is in_progress without an expiration",
                    record.name
                )));
            }
        };

        Ok(Self {
            name: record.name,
            state,
            version: record.version,
            payload: record.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn decode(value: Value) -> DomainResult<Job> {
        let record: JobRecord = serde_json::from_value(value)
            .map_err(|e| DomainError::validation(e.to_string()))?;
        Job::try_from(record)
    }

    #[test]
    fn missing_state_decodes_as_idle() {
        let job = decode(json!({ "name": "build-1" })).unwrap();
        assert_eq!(job.state, JobState::Idle);
        assert_eq!(job.version, 0);
    }

    #[test]
    fn in_progress_decodes_with_expiration() {
        let job = decode(json!({
            "name": "build-1",
            "state": "in_progress",
            "expiration": 1_700_000_000_000i64,
            "version": 3
        }))
        .unwrap();

        assert_eq!(
            job.state,
            JobState::InProgress {
                expiration: at(1_700_000_000)
            }
        );
        assert_eq!(job.version, 3);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let err = decode(json!({ "name": "build-1", "state": "paused" }));
        assert!(err.is_err());
    }

    #[test]
    fn in_progress_without_expiration_is_rejected() {
        let err = decode(json!({ "name": "build-1", "state": "in_progress" })).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn idle_ignores_stale_expiration() {
        let job = decode(json!({
            "name": "build-1",
            "state": "idle",
            "expiration": 1_700_000_000_000i64
        }))
        .unwrap();
        assert!(job.state.is_idle());
        assert_eq!(job.state.expiration(), None);
    }

    #[test]
    fn payload_round_trips_through_record() {
        let job = Job::new("nightly")
            .unwrap()
            .with_field("repository", "core")
            .with_field("attempts", 2);

        let value = serde_json::to_value(JobRecord::from(&job)).unwrap();
        assert_eq!(value["state"], json!("idle"));
        assert!(value.get("expiration").is_none());
        assert_eq!(value["repository"], json!("core"));

        let back = decode(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn reserved_payload_fields_fail_validation() {
        let job = Job::new("nightly").unwrap().with_field("state", "idle");
        assert!(matches!(job.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn lapse_is_strict() {
        let expiration = at(1_000);
        let state = JobState::InProgress { expiration };

        assert!(!state.is_lapsed(expiration - Duration::seconds(1)));
        assert!(!state.is_lapsed(expiration));
        assert!(state.is_lapsed(expiration + Duration::milliseconds(1)));
        assert!(!JobState::Idle.is_lapsed(expiration));
    }
}
