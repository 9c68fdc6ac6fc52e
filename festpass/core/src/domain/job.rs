// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Jobs
//!
//! Work items connecting a confirmed registration to the worker pool. The
//! queue is keyed by registration id with at most one live job per key, so a
//! duplicate confirm or reprocess is absorbed instead of double-processing.
//!
//! Job records are observability data with bounded retention; the
//! Registration record is the durable source of truth for outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::registration::RegistrationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Full pipeline: photo fetch, bounded AI enhancement, compositing.
    GenerateFullCredential,
    /// Expedited pipeline without the enhancement step.
    GenerateSimpleCredential,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::GenerateFullCredential => "generate_full_credential",
            JobKind::GenerateSimpleCredential => "generate_simple_credential",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub registration_id: RegistrationId,
    /// Zero-based count of executions already attempted.
    pub attempt: u32,
    /// Earliest instant the job may next be handed to a worker.
    pub next_retry_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: JobKind, registration_id: RegistrationId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            registration_id,
            attempt: 0,
            next_retry_at: now,
            enqueued_at: now,
        }
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Reference returned to callers and operator tooling on enqueue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub enqueued_at: DateTime<Utc>,
}

/// Terminal fate of a job, kept in the bounded retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedJob {
    pub job: Job,
    pub outcome: JobOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Backoff schedule for classified-transient failures.
///
/// Delay before attempt `n` (zero-based) is `base × multiplier^n`, which is
/// strictly increasing for `multiplier ≥ 2`. After `max_attempts` executions
/// the registration is marked failed exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(with = "duration_secs")]
    pub base: Duration,
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            multiplier: 2,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay to apply before re-running a job that has already executed
    /// `attempt + 1` times.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * self.multiplier.pow(attempt)
    }

    /// Whether a job at the given attempt count may run again.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue is shut down")]
    Closed,
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delays_are_strictly_increasing() {
        let policy = RetryPolicy::default();
        let mut prev = Duration::ZERO;
        for attempt in 0..policy.max_attempts {
            let delay = policy.delay(attempt);
            assert!(delay > prev, "attempt {attempt}: {delay:?} !> {prev:?}");
            prev = delay;
        }
    }

    #[test]
    fn retry_cap_is_enforced() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn fresh_jobs_are_immediately_due() {
        let job = Job::new(JobKind::GenerateFullCredential, RegistrationId::new());
        assert_eq!(job.attempt, 0);
        assert!(job.next_retry_at <= Utc::now());
    }
}
