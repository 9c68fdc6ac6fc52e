// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Registration Application Service
//!
//! Orchestrates the single-shot submission flow: admission through the rule
//! engine, registration code allocation, persistence, confirm, and job
//! enqueue. Handlers calling into this service stay short-lived; all slow
//! work is deferred to the queue and worker pool.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Admission control and registration lifecycle
//! - **Dependencies:** Domain (rules, registration), ports (repository,
//!   sequence, queue, object store), event bus

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::catalog::{EventCode, UnknownEventError};
use crate::domain::config::RegistrationConfig;
use crate::domain::events::RegistrationEvent;
use crate::domain::job::{JobHandle, JobKind, QueueError};
use crate::domain::registration::{
    ContactInfo, Participant, ParticipantDraft, Registration, RegistrationCode, RegistrationId,
    RegistrationStatus, Role, SelectedEvent,
};
use crate::domain::repository::{
    JobQueue, RegistrationRepository, RegistrationSequence, RepositoryError, StatusUpdate,
};
use crate::domain::rules::{
    self, ConflictError, ParticipantError, SelectionError,
};
use crate::domain::storage::{Bucket, ObjectKey, ObjectStore, StorageError};
use crate::infrastructure::event_bus::EventBus;

/// One event pick as submitted by the intake layer.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSelection {
    pub event: String,
    pub participants: Vec<ParticipantDraft>,
}

/// Parsed, normalized registration payload from the intake layer.
#[derive(Debug, Clone)]
pub struct SubmitPayload {
    pub contact: ContactInfo,
    pub selections: Vec<RawSelection>,
    /// The primary contact's portrait, already decoded from transport.
    pub photo: Option<Vec<u8>>,
}

/// Returned to the client on a successful submit.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub registration_id: RegistrationId,
    pub registration_code: String,
    pub job: JobHandle,
}

/// Synchronous admission failure, never retried.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    UnknownEvent(#[from] UnknownEventError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("{event}: {source}")]
    Participants {
        event: EventCode,
        source: ParticipantError,
    },

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("invalid contact email: '{email}'")]
    InvalidContactEmail { email: String },
}

impl AdmissionError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            AdmissionError::UnknownEvent(_) => "unknown_event",
            AdmissionError::Selection(e) => e.reason_code(),
            AdmissionError::Participants { source, .. } => source.reason_code(),
            AdmissionError::Conflict(e) => e.reason_code(),
            AdmissionError::InvalidContactEmail { .. } => "contact_invalid_email",
        }
    }
}

/// Structured admission decision handed to the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn accepted() -> Self {
        Self {
            ok: true,
            reason_code: None,
            message: None,
        }
    }

    pub fn rejected(error: &AdmissionError) -> Self {
        Self {
            ok: false,
            reason_code: Some(error.reason_code().to_string()),
            message: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("registration not found: {0}")]
    NotFound(RegistrationId),

    #[error("operation not permitted from status '{status}'")]
    InvalidState { status: RegistrationStatus },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct RegistrationService {
    repository: Arc<dyn RegistrationRepository>,
    sequence: Arc<dyn RegistrationSequence>,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ObjectStore>,
    event_bus: Arc<EventBus>,
    config: RegistrationConfig,
    /// Resolved at startup from the enhancer probe; selects the job kind.
    enhancement_available: bool,
}

impl RegistrationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn RegistrationRepository>,
        sequence: Arc<dyn RegistrationSequence>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ObjectStore>,
        event_bus: Arc<EventBus>,
        config: RegistrationConfig,
        enhancement_available: bool,
    ) -> Self {
        Self {
            repository,
            sequence,
            queue,
            store,
            event_bus,
            config,
            enhancement_available,
        }
    }

    /// Admit and confirm a submission in one shot.
    ///
    /// Validation runs before anything is persisted; an inadmissible payload
    /// leaves no trace. On admission the registration is created in `Draft`,
    /// confirmed (`Draft → Processing`), and a credential job is enqueued.
    pub async fn submit(&self, payload: SubmitPayload) -> Result<SubmissionReceipt, ServiceError> {
        let resolved = self.validate_payload(&payload).await?;

        let code = self.allocate_code().await;
        info!(code = %code, contact = %payload.contact.email, "Registration admitted");

        let profile_photo = match &payload.photo {
            Some(bytes) => {
                let key = ObjectKey::new(Bucket::Photos, format!("{code}/profile"));
                self.store.put(&key, bytes).await?;
                Some(key)
            }
            None => None,
        };

        let contact_email = payload.contact.email.clone();
        let events = resolved
            .into_iter()
            .map(|(event_code, participants)| SelectedEvent {
                code: event_code,
                participants: participants
                    .into_iter()
                    .map(|d| {
                        let role = if d.email.eq_ignore_ascii_case(&contact_email) {
                            Role::Primary
                        } else {
                            Role::Member
                        };
                        Participant {
                            name: d.name,
                            email: d.email,
                            phone: d.phone,
                            photo_key: d.photo_key,
                            role,
                        }
                    })
                    .collect(),
            })
            .collect();

        let registration = Registration::new(
            RegistrationCode(code),
            payload.contact,
            events,
            profile_photo,
        );
        self.repository.save(&registration).await?;

        self.event_bus.publish(RegistrationEvent::Submitted {
            registration_id: registration.id,
            code: registration.code.0.clone(),
            at: Utc::now(),
        });

        let job = self.confirm(registration.id).await?;

        Ok(SubmissionReceipt {
            registration_id: registration.id,
            registration_code: registration.code.0,
            job,
        })
    }

    /// Confirm a draft: re-validate the stored payload, transition
    /// `Draft → Processing`, and enqueue the credential job.
    ///
    /// Idempotent: a duplicate confirm for a registration already in
    /// `Processing` is absorbed by the conditional update plus the queue's
    /// per-key dedup, yielding the existing job handle.
    pub async fn confirm(&self, id: RegistrationId) -> Result<JobHandle, ServiceError> {
        let registration = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound(id))?;

        // Defense against partially-updated drafts: the stored payload must
        // still pass the same admission rules.
        self.validate_stored(&registration).await?;

        let applied = self
            .repository
            .update_status_if(
                id,
                RegistrationStatus::Draft,
                StatusUpdate::to(RegistrationStatus::Processing),
            )
            .await?;

        if !applied {
            let current = self
                .repository
                .find_by_id(id)
                .await?
                .ok_or(ServiceError::NotFound(id))?;
            if current.status != RegistrationStatus::Processing {
                return Err(ServiceError::InvalidState {
                    status: current.status,
                });
            }
            // Already confirmed; fall through so the enqueue below absorbs
            // this call against the live job.
        }

        let receipt = self.queue.enqueue(self.job_kind(), id).await?;
        if receipt.deduplicated {
            info!(registration_id = %id, "Duplicate confirm absorbed by live job");
        } else {
            metrics::counter!("festpass_jobs_enqueued_total").increment(1);
            self.event_bus.publish(RegistrationEvent::Confirmed {
                registration_id: id,
                job_id: receipt.handle.id,
                at: Utc::now(),
            });
        }

        Ok(receipt.handle)
    }

    /// Operator-triggered recovery for a `Failed` or `Partial` registration.
    ///
    /// Re-enqueues a job against the existing record without re-validating
    /// selection rules (the data is assumed unchanged).
    pub async fn reprocess(&self, id: RegistrationId) -> Result<JobHandle, ServiceError> {
        let registration = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound(id))?;

        if !matches!(
            registration.status,
            RegistrationStatus::Failed | RegistrationStatus::Partial
        ) {
            return Err(ServiceError::InvalidState {
                status: registration.status,
            });
        }

        let applied = self
            .repository
            .update_status_if(
                id,
                registration.status,
                StatusUpdate::to(RegistrationStatus::Processing),
            )
            .await?;
        if !applied {
            let current = self
                .repository
                .find_by_id(id)
                .await?
                .ok_or(ServiceError::NotFound(id))?;
            return Err(ServiceError::InvalidState {
                status: current.status,
            });
        }

        let receipt = self.queue.enqueue(self.job_kind(), id).await?;
        metrics::counter!("festpass_reprocess_total").increment(1);
        self.event_bus.publish(RegistrationEvent::ReprocessRequested {
            registration_id: id,
            job_id: receipt.handle.id,
            at: Utc::now(),
        });

        info!(registration_id = %id, job_id = %receipt.handle.id, "Reprocess enqueued");
        Ok(receipt.handle)
    }

    fn job_kind(&self) -> JobKind {
        if self.enhancement_available {
            JobKind::GenerateFullCredential
        } else {
            JobKind::GenerateSimpleCredential
        }
    }

    /// Run the full rule set against an incoming payload, returning the
    /// resolved event codes with their rosters.
    async fn validate_payload(
        &self,
        payload: &SubmitPayload,
    ) -> Result<Vec<(EventCode, Vec<ParticipantDraft>)>, ServiceError> {
        if !rules::is_valid_email(&payload.contact.email) {
            return Err(AdmissionError::InvalidContactEmail {
                email: payload.contact.email.clone(),
            }
            .into());
        }

        let mut resolved = Vec::with_capacity(payload.selections.len());
        for selection in &payload.selections {
            let code = EventCode::resolve(&selection.event).map_err(AdmissionError::from)?;
            resolved.push((code, selection.participants.clone()));
        }

        let codes: Vec<EventCode> = resolved.iter().map(|(c, _)| *c).collect();
        rules::validate_selection(&codes).map_err(AdmissionError::from)?;

        for (code, participants) in &resolved {
            let def = code.definition();
            rules::validate_participants(participants, def.min_participants, def.max_participants)
                .map_err(|source| AdmissionError::Participants {
                    event: *code,
                    source,
                })?;
        }

        let prior = self.prior_events(&payload.contact.email).await?;
        rules::check_cross_registration(&prior, &codes).map_err(AdmissionError::from)?;

        Ok(resolved)
    }

    /// Re-run the admission rules against a stored registration.
    async fn validate_stored(&self, registration: &Registration) -> Result<(), ServiceError> {
        let codes = registration.event_codes();
        rules::validate_selection(&codes).map_err(AdmissionError::from)?;

        for event in &registration.events {
            let def = event.code.definition();
            let drafts: Vec<ParticipantDraft> = event
                .participants
                .iter()
                .map(|p| ParticipantDraft {
                    name: p.name.clone(),
                    email: p.email.clone(),
                    phone: p.phone.clone(),
                    photo_key: p.photo_key.clone(),
                })
                .collect();
            rules::validate_participants(&drafts, def.min_participants, def.max_participants)
                .map_err(|source| AdmissionError::Participants {
                    event: event.code,
                    source,
                })?;
        }
        Ok(())
    }

    /// Union of events held by prior registrations for a contact. Confirmed
    /// and in-flight registrations all count; only drafts that never left
    /// intake are excluded from the caps.
    async fn prior_events(&self, contact_email: &str) -> Result<Vec<EventCode>, ServiceError> {
        let prior = self.repository.find_by_contact_email(contact_email).await?;
        let mut events = Vec::new();
        for registration in prior
            .iter()
            .filter(|r| r.status != RegistrationStatus::Draft)
        {
            for code in registration.event_codes() {
                if !events.contains(&code) {
                    events.push(code);
                }
            }
        }
        Ok(events)
    }

    /// Allocate a registration code, preferring the shared sequence.
    ///
    /// The fallback path (sequence unavailable) derives a time token plus
    /// random suffix. Collisions are astronomically unlikely but not
    /// mathematically excluded, so the degraded allocation is logged at WARN
    /// with its own shape (`<prefix>-<timestamp>-<suffix>`).
    async fn allocate_code(&self) -> String {
        match self.sequence.next().await {
            Ok(value) => format!(
                "{}-{:0width$}",
                self.config.code_prefix,
                value,
                width = self.config.code_width
            ),
            Err(e) => {
                let timestamp = Utc::now().format("%y%m%d%H%M%S");
                let suffix = uuid::Uuid::new_v4().simple().to_string()[..6].to_string();
                let code = format!("{}-{}-{}", self.config.code_prefix, timestamp, suffix);
                warn!(
                    code = %code,
                    error = %e,
                    "Sequence unavailable - allocated time-based registration code"
                );
                code
            }
        }
    }
}
