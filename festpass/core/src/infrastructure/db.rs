// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that can be
//! injected into all PostgreSQL repository implementations.
//!
//! In-memory backends cover development and testing; this module is required
//! only when `database.url` is set in `festpass.yaml`.

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Schema applied at startup. Idempotent.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS registrations (
    id            UUID PRIMARY KEY,
    code          TEXT NOT NULL UNIQUE,
    status        TEXT NOT NULL,
    contact_email TEXT NOT NULL,
    record        JSONB NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS registrations_contact_email
    ON registrations (contact_email);

CREATE SEQUENCE IF NOT EXISTS registration_code_seq START 1;

CREATE TABLE IF NOT EXISTS jobs (
    id              UUID PRIMARY KEY,
    registration_id UUID NOT NULL,
    kind            TEXT NOT NULL,
    attempt         INTEGER NOT NULL DEFAULT 0,
    next_retry_at   TIMESTAMPTZ NOT NULL,
    enqueued_at     TIMESTAMPTZ NOT NULL,
    state           TEXT NOT NULL DEFAULT 'pending',
    outcome         JSONB,
    finished_at     TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS jobs_live_key
    ON jobs (registration_id) WHERE state <> 'done';
CREATE INDEX IF NOT EXISTS jobs_pending_due
    ON jobs (next_retry_at) WHERE state = 'pending';
"#;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the idempotent schema.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
