// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root, following the DDD
//! Repository pattern: one repository per aggregate, interface defined in the
//! domain layer, implemented in `crate::infrastructure`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `RegistrationRepository` | `Registration` | `InMemoryRegistrationRepository`, `PostgresRegistrationRepository` |
//! | `RegistrationSequence` | registration code counter | `InMemoryRegistrationSequence`, `PostgresRegistrationSequence` |
//! | `JobQueue` | `Job` | `InMemoryJobQueue`, `PostgresJobQueue` |
//!
//! Concrete implementations are selected at startup from configuration.
//! In-memory implementations serve development and testing; PostgreSQL
//! implementations serve production deployments.

use async_trait::async_trait;

use crate::domain::job::{FinishedJob, Job, JobHandle, JobKind, JobOutcome, QueueError};
use crate::domain::registration::{
    CredentialRecord, Registration, RegistrationId, RegistrationStatus,
};
use crate::domain::storage::ObjectKey;

/// Fields applied together with a conditional status transition.
///
/// `error` always overwrites the stored error message; pass `None` to clear
/// it on a successful terminal write.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: RegistrationStatus,
    pub credentials: Option<Vec<CredentialRecord>>,
    pub enhanced_photo: Option<ObjectKey>,
    pub error: Option<String>,
}

impl StatusUpdate {
    /// A bare status transition with no side fields.
    pub fn to(status: RegistrationStatus) -> Self {
        Self {
            status,
            credentials: None,
            enhanced_photo: None,
            error: None,
        }
    }
}

/// Repository interface for Registration aggregates
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Save registration (create or update)
    async fn save(&self, registration: &Registration) -> Result<(), RepositoryError>;

    /// Find registration by ID
    async fn find_by_id(&self, id: RegistrationId)
        -> Result<Option<Registration>, RepositoryError>;

    /// Find registration by human-readable code
    async fn find_by_code(&self, code: &str) -> Result<Option<Registration>, RepositoryError>;

    /// All registrations submitted by a contact email (case-insensitive)
    async fn find_by_contact_email(
        &self,
        email: &str,
    ) -> Result<Vec<Registration>, RepositoryError>;

    /// Atomic conditional update: apply `update` only if the current status
    /// equals `expected`. Returns whether the update was applied. This is the
    /// sole write path for terminal transitions, so a worker's terminal write
    /// and an operator's reprocess cannot race into an inconsistent state.
    async fn update_status_if(
        &self,
        id: RegistrationId,
        expected: RegistrationStatus,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError>;
}

/// Shared counter backing sequence-allocated registration codes.
///
/// `next` must be atomic under concurrent callers: two simultaneous
/// registrations never observe the same value.
#[async_trait]
pub trait RegistrationSequence: Send + Sync {
    async fn next(&self) -> Result<u64, SequenceError>;
}

/// Keyed work queue port feeding the worker pool.
///
/// The queue guarantees at most one live job per registration id: a second
/// `enqueue` for a key with a pending or running job is absorbed and returns
/// the existing handle with `deduplicated = true`.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for a registration, deduplicating by key.
    async fn enqueue(
        &self,
        kind: JobKind,
        registration_id: RegistrationId,
    ) -> Result<EnqueueReceipt, QueueError>;

    /// Take the next due job, waiting until one is available. The job's key
    /// stays reserved until `complete` or `retry` is called for it.
    async fn dequeue(&self) -> Result<Job, QueueError>;

    /// Finish a job, releasing its key and recording the outcome in the
    /// bounded retention window.
    async fn complete(&self, job: &Job, outcome: JobOutcome) -> Result<(), QueueError>;

    /// Re-schedule a job after a transient failure with the given delay.
    /// The key stays reserved; the attempt counter increments.
    async fn retry(
        &self,
        job: &Job,
        delay: std::time::Duration,
        error: String,
    ) -> Result<(), QueueError>;

    /// Number of jobs pending or running.
    async fn depth(&self) -> Result<usize, QueueError>;

    /// Recently finished jobs, newest first (bounded retention).
    async fn recent(&self) -> Result<Vec<FinishedJob>, QueueError>;
}

/// Result of an enqueue call.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueReceipt {
    pub handle: JobHandle,
    /// True when an existing live job for the key absorbed this call.
    pub deduplicated: bool,
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Sequence errors
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("Sequence unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for SequenceError {
    fn from(err: sqlx::Error) -> Self {
        SequenceError::Unavailable(err.to_string())
    }
}
