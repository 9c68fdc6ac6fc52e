// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Events
//!
//! Provides events functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements events

// Domain events describing the registration pipeline's observable moments.
// Published fire-and-forget on the event bus; no return value is consumed
// by the core. Subscribers (notification sink, operator tooling) are free
// to lag or disconnect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;
use crate::domain::registration::{RegistrationId, RegistrationStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistrationEvent {
    Submitted {
        registration_id: RegistrationId,
        code: String,
        at: DateTime<Utc>,
    },
    Confirmed {
        registration_id: RegistrationId,
        job_id: JobId,
        at: DateTime<Utc>,
    },
    ReprocessRequested {
        registration_id: RegistrationId,
        job_id: JobId,
        at: DateTime<Utc>,
    },
    JobStarted {
        registration_id: RegistrationId,
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },
    JobRetried {
        registration_id: RegistrationId,
        job_id: JobId,
        attempt: u32,
        delay_ms: u64,
        reason: String,
        at: DateTime<Utc>,
    },
    EnhancementDegraded {
        registration_id: RegistrationId,
        reason: String,
        at: DateTime<Utc>,
    },
    CredentialRendered {
        registration_id: RegistrationId,
        participant_email: String,
        placeholder: bool,
        at: DateTime<Utc>,
    },
    Terminal {
        registration_id: RegistrationId,
        status: RegistrationStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    },
}

impl RegistrationEvent {
    pub fn registration_id(&self) -> RegistrationId {
        match self {
            RegistrationEvent::Submitted { registration_id, .. }
            | RegistrationEvent::Confirmed { registration_id, .. }
            | RegistrationEvent::ReprocessRequested { registration_id, .. }
            | RegistrationEvent::JobStarted { registration_id, .. }
            | RegistrationEvent::JobRetried { registration_id, .. }
            | RegistrationEvent::EnhancementDegraded { registration_id, .. }
            | RegistrationEvent::CredentialRendered { registration_id, .. }
            | RegistrationEvent::Terminal { registration_id, .. } => *registration_id,
        }
    }
}
