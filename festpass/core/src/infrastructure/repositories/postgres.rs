// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL repository implementations.
//!
//! The registration aggregate is stored as a JSONB document with the columns
//! needed for querying and the conditional update (status, contact email)
//! promoted alongside it. The job queue uses `FOR UPDATE SKIP LOCKED` for
//! worker hand-off and a partial unique index on the registration id for
//! per-key dedup, so at most one live job per key exists even across
//! concurrent API instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::time::Duration;

use crate::domain::job::{FinishedJob, Job, JobHandle, JobId, JobKind, JobOutcome, QueueError};
use crate::domain::registration::{Registration, RegistrationId, RegistrationStatus};
use crate::domain::repository::{
    EnqueueReceipt, JobQueue, RegistrationRepository, RegistrationSequence, RepositoryError,
    SequenceError, StatusUpdate,
};

pub struct PostgresRegistrationRepository {
    pool: PgPool,
}

impl PostgresRegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(record: serde_json::Value) -> Result<Registration, RepositoryError> {
        serde_json::from_value(record).map_err(RepositoryError::from)
    }
}

#[async_trait]
impl RegistrationRepository for PostgresRegistrationRepository {
    async fn save(&self, registration: &Registration) -> Result<(), RepositoryError> {
        let record = serde_json::to_value(registration)?;

        sqlx::query(
            r#"
            INSERT INTO registrations (id, code, status, contact_email, record, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                contact_email = EXCLUDED.contact_email,
                record = EXCLUDED.record,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(registration.id.0)
        .bind(&registration.code.0)
        .bind(registration.status.as_str())
        .bind(registration.contact.email.to_ascii_lowercase())
        .bind(record)
        .bind(registration.created_at)
        .bind(registration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save registration: {e}")))?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        let row = sqlx::query("SELECT record FROM registrations WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(|r| Self::decode(r.get("record"))).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Registration>, RepositoryError> {
        let row = sqlx::query("SELECT record FROM registrations WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(|r| Self::decode(r.get("record"))).transpose()
    }

    async fn find_by_contact_email(
        &self,
        email: &str,
    ) -> Result<Vec<Registration>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT record FROM registrations WHERE contact_email = $1 ORDER BY created_at",
        )
        .bind(email.to_ascii_lowercase())
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.into_iter()
            .map(|r| Self::decode(r.get("record")))
            .collect()
    }

    async fn update_status_if(
        &self,
        id: RegistrationId,
        expected: RegistrationStatus,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let row = sqlx::query("SELECT record FROM registrations WHERE id = $1 FOR UPDATE")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };

        let mut registration = Self::decode(row.get("record"))?;
        if registration.status != expected {
            // Leave the row untouched; the caller lost the race.
            tx.rollback().await.map_err(RepositoryError::from)?;
            return Ok(false);
        }

        registration.status = update.status;
        if let Some(credentials) = update.credentials {
            registration.credentials = credentials;
        }
        if let Some(enhanced) = update.enhanced_photo {
            registration.enhanced_photo = Some(enhanced);
        }
        registration.error = update.error;
        registration.touch();

        let record = serde_json::to_value(&registration)?;
        sqlx::query(
            "UPDATE registrations SET status = $2, record = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id.0)
        .bind(registration.status.as_str())
        .bind(record)
        .bind(registration.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(true)
    }
}

/// Registration code counter backed by a native PostgreSQL sequence, shared
/// across all service instances.
pub struct PostgresRegistrationSequence {
    pool: PgPool,
}

impl PostgresRegistrationSequence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationSequence for PostgresRegistrationSequence {
    async fn next(&self) -> Result<u64, SequenceError> {
        let value: i64 = sqlx::query_scalar("SELECT nextval('registration_code_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(value as u64)
    }
}

pub struct PostgresJobQueue {
    pool: PgPool,
    retention: i64,
    poll_interval: Duration,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, retention: usize) -> Self {
        Self {
            pool,
            retention: retention as i64,
            poll_interval: Duration::from_millis(500),
        }
    }

    fn kind_from_str(kind: &str) -> Result<JobKind, QueueError> {
        match kind {
            "generate_full_credential" => Ok(JobKind::GenerateFullCredential),
            "generate_simple_credential" => Ok(JobKind::GenerateSimpleCredential),
            other => Err(QueueError::Backend(format!("unknown job kind: {other}"))),
        }
    }

    fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, QueueError> {
        Ok(Job {
            id: JobId(row.get("id")),
            kind: Self::kind_from_str(row.get("kind"))?,
            registration_id: RegistrationId(row.get("registration_id")),
            attempt: row.get::<i32, _>("attempt") as u32,
            next_retry_at: row.get("next_retry_at"),
            enqueued_at: row.get("enqueued_at"),
        })
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        kind: JobKind,
        registration_id: RegistrationId,
    ) -> Result<EnqueueReceipt, QueueError> {
        let job = Job::new(kind, registration_id);

        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (id, registration_id, kind, attempt, next_retry_at, enqueued_at, state)
            VALUES ($1, $2, $3, 0, $4, $5, 'pending')
            ON CONFLICT (registration_id) WHERE state <> 'done' DO NOTHING
            "#,
        )
        .bind(job.id.0)
        .bind(registration_id.0)
        .bind(kind.as_str())
        .bind(job.next_retry_at)
        .bind(job.enqueued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        if inserted.rows_affected() > 0 {
            return Ok(EnqueueReceipt {
                handle: job.handle(),
                deduplicated: false,
            });
        }

        // A live job for this key absorbed the enqueue; hand back its handle.
        let row = sqlx::query(
            "SELECT id, enqueued_at FROM jobs WHERE registration_id = $1 AND state <> 'done'",
        )
        .bind(registration_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(EnqueueReceipt {
            handle: JobHandle {
                id: JobId(row.get("id")),
                enqueued_at: row.get::<DateTime<Utc>, _>("enqueued_at"),
            },
            deduplicated: true,
        })
    }

    async fn dequeue(&self) -> Result<Job, QueueError> {
        loop {
            let row = sqlx::query(
                r#"
                UPDATE jobs SET state = 'running'
                WHERE id = (
                    SELECT id FROM jobs
                    WHERE state = 'pending' AND next_retry_at <= now()
                    ORDER BY next_retry_at
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, registration_id, kind, attempt, next_retry_at, enqueued_at
                "#,
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

            match row {
                Some(row) => return Self::job_from_row(&row),
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    async fn complete(&self, job: &Job, outcome: JobOutcome) -> Result<(), QueueError> {
        let outcome_json = serde_json::to_value(&outcome)?;

        sqlx::query(
            "UPDATE jobs SET state = 'done', outcome = $2, finished_at = now() WHERE id = $1",
        )
        .bind(job.id.0)
        .bind(outcome_json)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        // Trim the retention window.
        sqlx::query(
            r#"
            DELETE FROM jobs WHERE state = 'done' AND id NOT IN (
                SELECT id FROM jobs WHERE state = 'done'
                ORDER BY finished_at DESC LIMIT $1
            )
            "#,
        )
        .bind(self.retention)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn retry(&self, job: &Job, delay: Duration, error: String) -> Result<(), QueueError> {
        tracing::debug!(
            job_id = %job.id,
            registration_id = %job.registration_id,
            error = %error,
            "Rescheduling job"
        );

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                attempt = attempt + 1,
                next_retry_at = now() + make_interval(secs => $2)
            WHERE id = $1
            "#,
        )
        .bind(job.id.0)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM jobs WHERE state <> 'done'")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(count as usize)
    }

    async fn recent(&self) -> Result<Vec<FinishedJob>, QueueError> {
        let rows = sqlx::query(
            r#"
            SELECT id, registration_id, kind, attempt, next_retry_at, enqueued_at, outcome, finished_at
            FROM jobs WHERE state = 'done'
            ORDER BY finished_at DESC
            LIMIT $1
            "#,
        )
        .bind(self.retention)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let outcome: JobOutcome = serde_json::from_value(row.get("outcome"))?;
                Ok(FinishedJob {
                    job: Self::job_from_row(row)?,
                    outcome,
                    finished_at: row.get("finished_at"),
                })
            })
            .collect()
    }
}
