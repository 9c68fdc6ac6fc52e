// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Worker
//!
//! Pull-based consumers executing queued credential jobs. The pool shares
//! one queue; per-key uniqueness in the queue is the only concurrency
//! control the pipeline needs, and the terminal write goes through the
//! repository's conditional update so it cannot race an operator reprocess.
//!
//! # Job execution
//!
//! ```text
//! dequeue -> load registration
//!         -> fetch profile photo          (transient errors retry)
//!         -> bounded AI enhancement       (degrades, never fails the job)
//!         -> compose one card per person  (missing photo -> placeholder,
//!                                          missing template -> fatal)
//!         -> persist artifacts
//!         -> CAS terminal write           (Completed / Partial / Failed)
//! ```
//!
//! There is no mid-flight cancellation: recovery for a bad outcome is a
//! fresh reprocess job, never an abort-in-place.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::credential::{ComposeError, CredentialFields, CredentialRenderer};
use crate::domain::enhance::EnhanceError;
use crate::domain::events::RegistrationEvent;
use crate::domain::job::{Job, JobKind, JobOutcome, RetryPolicy};
use crate::domain::registration::{
    derive_status, CredentialOutcome, CredentialRecord, Registration, RegistrationId,
    RegistrationStatus, RosterEntry,
};
use crate::domain::repository::{JobQueue, RegistrationRepository, StatusUpdate};
use crate::domain::storage::{Bucket, ObjectKey, ObjectStore};
use crate::infrastructure::enhance::EnhancerSelection;
use crate::infrastructure::event_bus::EventBus;

const NO_CREDENTIALS_MESSAGE: &str = "no credentials could be generated";

/// Internal failure classification driving retry behavior.
#[derive(Debug)]
enum ProcessError {
    /// Storage or network hiccup; retried with backoff up to the cap.
    Transient(String),
    /// Missing mandatory asset or unusable record; never retried.
    Fatal(String),
}

impl ProcessError {
    fn into_message(self) -> String {
        match self {
            ProcessError::Transient(m) | ProcessError::Fatal(m) => m,
        }
    }
}

enum ProcessOutcome {
    /// Pipeline ran to a terminal write with the derived status.
    Finished(RegistrationStatus),
    /// Job was stale (registration no longer processing); nothing done.
    Skipped(RegistrationStatus),
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    repository: Arc<dyn RegistrationRepository>,
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn CredentialRenderer>,
    enhancer: EnhancerSelection,
    event_bus: Arc<EventBus>,
    retry: RetryPolicy,
    enhancement_timeout: Duration,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        repository: Arc<dyn RegistrationRepository>,
        store: Arc<dyn ObjectStore>,
        renderer: Arc<dyn CredentialRenderer>,
        enhancer: EnhancerSelection,
        event_bus: Arc<EventBus>,
        retry: RetryPolicy,
        enhancement_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            repository,
            store,
            renderer,
            enhancer,
            event_bus,
            retry,
            enhancement_timeout,
        }
    }

    /// Consume jobs until the token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Worker shutting down");
                    return;
                }
                job = self.queue.dequeue() => match job {
                    Ok(job) => self.handle(job).await,
                    Err(e) => {
                        error!("Queue dequeue failed: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    /// Execute one job and settle it against the queue and the registration.
    pub async fn handle(&self, job: Job) {
        metrics::counter!("festpass_jobs_started_total").increment(1);
        self.event_bus.publish(RegistrationEvent::JobStarted {
            registration_id: job.registration_id,
            job_id: job.id,
            attempt: job.attempt,
            at: Utc::now(),
        });

        match self.execute(&job).await {
            Ok(ProcessOutcome::Finished(status)) => {
                info!(
                    job_id = %job.id,
                    registration_id = %job.registration_id,
                    status = %status,
                    "Job finished"
                );
                metrics::counter!("festpass_jobs_completed_total").increment(1);
                let outcome = if status == RegistrationStatus::Failed {
                    JobOutcome::Failed {
                        message: NO_CREDENTIALS_MESSAGE.to_string(),
                    }
                } else {
                    JobOutcome::Completed
                };
                self.settle(&job, outcome).await;
            }
            Ok(ProcessOutcome::Skipped(status)) => {
                debug!(
                    job_id = %job.id,
                    registration_id = %job.registration_id,
                    status = %status,
                    "Stale job skipped"
                );
                self.settle(&job, JobOutcome::Completed).await;
            }
            Err(ProcessError::Transient(reason)) if self.retry.allows_retry(job.attempt) => {
                let delay = self.retry.delay(job.attempt);
                warn!(
                    job_id = %job.id,
                    registration_id = %job.registration_id,
                    attempt = job.attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Transient failure - retrying with backoff"
                );
                metrics::counter!("festpass_job_retries_total").increment(1);
                self.event_bus.publish(RegistrationEvent::JobRetried {
                    registration_id: job.registration_id,
                    job_id: job.id,
                    attempt: job.attempt + 1,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.clone(),
                    at: Utc::now(),
                });
                if let Err(e) = self.queue.retry(&job, delay, reason).await {
                    error!(job_id = %job.id, "Failed to reschedule job: {e}");
                }
            }
            Err(err) => {
                let message = err.into_message();
                error!(
                    job_id = %job.id,
                    registration_id = %job.registration_id,
                    attempt = job.attempt,
                    "Job failed permanently: {message}"
                );
                metrics::counter!("festpass_jobs_failed_total").increment(1);
                self.mark_failed(job.registration_id, &message).await;
                self.settle(&job, JobOutcome::Failed { message }).await;
            }
        }
    }

    async fn settle(&self, job: &Job, outcome: JobOutcome) {
        if let Err(e) = self.queue.complete(job, outcome).await {
            error!(job_id = %job.id, "Failed to settle job: {e}");
        }
    }

    /// Terminal failure write. The conditional update only applies while the
    /// registration is still `Processing`, so the record reaches `Failed`
    /// exactly once even if a reprocess races in.
    async fn mark_failed(&self, id: RegistrationId, message: &str) {
        match self
            .repository
            .update_status_if(
                id,
                RegistrationStatus::Processing,
                StatusUpdate {
                    status: RegistrationStatus::Failed,
                    credentials: None,
                    enhanced_photo: None,
                    error: Some(message.to_string()),
                },
            )
            .await
        {
            Ok(true) => {
                self.event_bus.publish(RegistrationEvent::Terminal {
                    registration_id: id,
                    status: RegistrationStatus::Failed,
                    error: Some(message.to_string()),
                    at: Utc::now(),
                });
            }
            Ok(false) => {
                debug!(registration_id = %id, "Registration left Processing concurrently; failure not recorded twice");
            }
            Err(e) => {
                error!(registration_id = %id, "Failed to record terminal failure: {e}");
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<ProcessOutcome, ProcessError> {
        let registration = self
            .repository
            .find_by_id(job.registration_id)
            .await
            .map_err(|e| ProcessError::Transient(e.to_string()))?
            .ok_or_else(|| {
                ProcessError::Fatal(format!("registration {} not found", job.registration_id))
            })?;

        if registration.status != RegistrationStatus::Processing {
            return Ok(ProcessOutcome::Skipped(registration.status));
        }

        let roster = registration.roster();
        if roster.is_empty() {
            return Err(ProcessError::Fatal(
                "registration has no participants".to_string(),
            ));
        }

        // (1) Fetch the stored profile photo.
        let mut profile_bytes = match &registration.profile_photo {
            Some(key) => match self.store.get(key).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.is_transient() => {
                    return Err(ProcessError::Transient(format!(
                        "profile photo fetch failed: {e}"
                    )))
                }
                Err(e) => {
                    warn!(registration_id = %registration.id, "Profile photo unavailable: {e}");
                    None
                }
            },
            None => None,
        };

        // (2) Bounded AI enhancement; degrades, never fails the job.
        let mut enhanced_key = None;
        if job.kind == JobKind::GenerateFullCredential {
            let enhancer = self.enhancer.active().cloned();
            if let (Some(bytes), Some(enhancer)) = (profile_bytes.clone(), enhancer) {
                if let Some((key, enhanced)) = self
                    .enhance_bounded(&registration, enhancer.as_ref(), &bytes)
                    .await
                {
                    profile_bytes = Some(enhanced);
                    enhanced_key = Some(key);
                }
            }
        }

        // (3) + (4) Compose and persist one credential per person.
        let mut records = Vec::with_capacity(roster.len());
        for entry in roster {
            let record = self
                .render_participant(&registration, &entry, profile_bytes.as_deref())
                .await?;
            records.push(record);
        }

        // (5) Derive the overall status and write it once, conditionally.
        let status = derive_status(&records);
        let error = (status == RegistrationStatus::Failed)
            .then(|| NO_CREDENTIALS_MESSAGE.to_string());
        let applied = self
            .repository
            .update_status_if(
                registration.id,
                RegistrationStatus::Processing,
                StatusUpdate {
                    status,
                    credentials: Some(records),
                    enhanced_photo: enhanced_key,
                    error: error.clone(),
                },
            )
            .await
            .map_err(|e| ProcessError::Transient(e.to_string()))?;

        if applied {
            self.event_bus.publish(RegistrationEvent::Terminal {
                registration_id: registration.id,
                status,
                error,
                at: Utc::now(),
            });
        } else {
            warn!(
                registration_id = %registration.id,
                "Terminal write lost the race; leaving registration untouched"
            );
        }

        Ok(ProcessOutcome::Finished(status))
    }

    /// Run the external enhancement under the configured timeout. Returns
    /// the stored enhanced photo on success, `None` on any degradation.
    async fn enhance_bounded(
        &self,
        registration: &Registration,
        enhancer: &dyn crate::domain::enhance::PhotoEnhancer,
        photo: &[u8],
    ) -> Option<(ObjectKey, Vec<u8>)> {
        let degraded = |reason: String| {
            warn!(registration_id = %registration.id, "Enhancement degraded: {reason}");
            metrics::counter!("festpass_enhancement_degraded_total").increment(1);
            self.event_bus.publish(RegistrationEvent::EnhancementDegraded {
                registration_id: registration.id,
                reason,
                at: Utc::now(),
            });
        };

        let enhanced = match tokio::time::timeout(self.enhancement_timeout, enhancer.enhance(photo))
            .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                degraded(match e {
                    EnhanceError::Timeout => "provider timed out".to_string(),
                    other => other.to_string(),
                });
                return None;
            }
            Err(_) => {
                degraded(format!(
                    "timed out after {}s",
                    self.enhancement_timeout.as_secs()
                ));
                return None;
            }
        };

        let key = ObjectKey::new(
            Bucket::Enhanced,
            format!("{}/profile", registration.code.0),
        );
        match self.store.put(&key, &enhanced).await {
            Ok(()) => Some((key, enhanced)),
            Err(e) => {
                degraded(format!("could not persist enhanced photo: {e}"));
                None
            }
        }
    }

    /// Compose and persist one participant's credential.
    ///
    /// Fatal asset errors abort the whole job; any other render failure
    /// degrades this participant only. Transient storage failures bubble up
    /// for retry.
    async fn render_participant(
        &self,
        registration: &Registration,
        entry: &RosterEntry,
        profile_bytes: Option<&[u8]>,
    ) -> Result<CredentialRecord, ProcessError> {
        let photo = if entry.is_primary {
            profile_bytes.map(<[u8]>::to_vec)
        } else {
            match &entry.photo_key {
                Some(key) => match self.store.get(key).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) if e.is_transient() => {
                        return Err(ProcessError::Transient(format!(
                            "participant photo fetch failed: {e}"
                        )))
                    }
                    Err(e) => {
                        warn!(participant = %entry.email, "Participant photo unavailable: {e}");
                        None
                    }
                },
                None => None,
            }
        };

        let fields = CredentialFields {
            participant_name: entry.name.clone(),
            organization: registration.contact.organization.clone(),
            events: entry.events.iter().map(|c| c.label().to_string()).collect(),
            registration_code: registration.code.0.clone(),
        };

        let renderer = self.renderer.clone();
        let render_started = std::time::Instant::now();
        let rendered = tokio::task::spawn_blocking(move || renderer.compose(&fields, photo.as_deref()))
            .await
            .map_err(|e| ProcessError::Transient(format!("render task failed: {e}")))?;
        metrics::histogram!("festpass_render_seconds").record(render_started.elapsed().as_secs_f64());

        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(ComposeError::FatalAsset(message)) => {
                // Deployment defect; abort the whole job without retry.
                return Err(ProcessError::Fatal(message));
            }
            Err(e) => {
                warn!(participant = %entry.email, "Credential render failed: {e}");
                return Ok(CredentialRecord {
                    participant_name: entry.name.clone(),
                    participant_email: entry.email.clone(),
                    outcome: CredentialOutcome::Failed {
                        message: e.to_string(),
                    },
                });
            }
        };

        let key = ObjectKey::new(
            Bucket::Credentials,
            format!("{}/{}.png", registration.code.0, slug(&entry.email)),
        );
        match self.store.put(&key, &rendered.bytes).await {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                return Err(ProcessError::Transient(format!(
                    "credential persist failed: {e}"
                )))
            }
            Err(e) => {
                return Ok(CredentialRecord {
                    participant_name: entry.name.clone(),
                    participant_email: entry.email.clone(),
                    outcome: CredentialOutcome::Failed {
                        message: e.to_string(),
                    },
                })
            }
        }

        metrics::counter!("festpass_credentials_rendered_total").increment(1);
        self.event_bus.publish(RegistrationEvent::CredentialRendered {
            registration_id: registration.id,
            participant_email: entry.email.clone(),
            placeholder: rendered.placeholder,
            at: Utc::now(),
        });

        Ok(CredentialRecord {
            participant_name: entry.name.clone(),
            participant_email: entry.email.clone(),
            outcome: if rendered.placeholder {
                CredentialOutcome::Placeholder { key }
            } else {
                CredentialOutcome::Rendered { key }
            },
        })
    }
}

/// Filesystem-safe object key segment for a participant email.
fn slug(email: &str) -> String {
    email
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Pool of independent consumers over one shared queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `count` consumers sharing the given worker.
    pub fn spawn(worker: Arc<Worker>, count: usize) -> Self {
        let shutdown = CancellationToken::new();
        let handles = (0..count)
            .map(|i| {
                let worker = worker.clone();
                let token = shutdown.clone();
                tokio::spawn(async move {
                    debug!(worker = i, "Worker consumer started");
                    worker.run(token).await;
                })
            })
            .collect();
        info!(count, "Worker pool started");
        Self { handles, shutdown }
    }

    /// Signal shutdown and wait for consumers to drain.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
