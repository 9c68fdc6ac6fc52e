// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Status Polling Projection
//!
//! Read-only view of a registration's pipeline state for the polling
//! endpoint. Polling never mutates state; the server keeps processing
//! whether or not anyone is watching.
//!
//! Credential links are minted fresh on every poll with a bounded TTL, so
//! no permanent public URL ever leaves the system and artifacts stay
//! revocable.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::registration::{RegistrationId, RegistrationStatus};
use crate::domain::repository::{RegistrationRepository, RepositoryError};
use crate::domain::storage::ObjectStore;

/// Client-side polling cadence: poll every [`POLL_INTERVAL`] for at most
/// [`MAX_POLL_ATTEMPTS`] rounds (~60s), then stop client-side. The client
/// may resume polling later; the server carries on regardless.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_POLL_ATTEMPTS: u32 = 12;

/// Time-limited reference to one participant's rendered credential.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialRef {
    pub participant_name: String,
    pub participant_email: String,
    pub url: String,
    pub placeholder: bool,
}

/// Projection returned by the polling endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStatusView {
    pub registration_id: RegistrationId,
    pub registration_code: String,
    pub status: RegistrationStatus,
    pub credential_refs: Vec<CredentialRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

pub struct StatusService {
    repository: Arc<dyn RegistrationRepository>,
    store: Arc<dyn ObjectStore>,
    url_ttl: Duration,
}

impl StatusService {
    pub fn new(
        repository: Arc<dyn RegistrationRepository>,
        store: Arc<dyn ObjectStore>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            store,
            url_ttl,
        }
    }

    /// Project the current state of a registration. `None` when the id is
    /// unknown.
    pub async fn view(
        &self,
        id: RegistrationId,
    ) -> Result<Option<RegistrationStatusView>, RepositoryError> {
        let Some(registration) = self.repository.find_by_id(id).await? else {
            return Ok(None);
        };

        let mut credential_refs = Vec::new();
        for record in &registration.credentials {
            let Some(key) = record.outcome.artifact_key() else {
                continue;
            };
            match self.store.signed_url(key, self.url_ttl).await {
                Ok(url) => credential_refs.push(CredentialRef {
                    participant_name: record.participant_name.clone(),
                    participant_email: record.participant_email.clone(),
                    url,
                    placeholder: matches!(
                        record.outcome,
                        crate::domain::registration::CredentialOutcome::Placeholder { .. }
                    ),
                }),
                Err(e) => {
                    // A revoked or missing artifact drops out of the view;
                    // the record itself stays untouched.
                    warn!(registration_id = %id, key = %key, error = %e, "Skipping unresolvable credential ref");
                }
            }
        }

        Ok(Some(RegistrationStatusView {
            registration_id: registration.id,
            registration_code: registration.code.0.clone(),
            status: registration.status,
            credential_refs,
            error_message: registration.error.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registration::{
        ContactInfo, CredentialOutcome, CredentialRecord, Registration, RegistrationCode,
    };
    use crate::domain::storage::{Bucket, ObjectKey};
    use crate::infrastructure::repositories::InMemoryRegistrationRepository;
    use crate::infrastructure::storage::{LocalObjectStore, UrlSigner};

    async fn fixture() -> (tempfile::TempDir, StatusService, Registration) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            LocalObjectStore::new(
                dir.path(),
                UrlSigner::new(b"secret".to_vec(), "http://localhost:8080"),
            )
            .unwrap(),
        );
        let repository = Arc::new(InMemoryRegistrationRepository::new());

        let mut registration = Registration::new(
            RegistrationCode("FEST-00007".to_string()),
            ContactInfo {
                name: "Asha Rao".to_string(),
                email: "asha@example.com".to_string(),
                phone: None,
                organization: "MEC".to_string(),
            },
            vec![],
            None,
        );
        registration.status = RegistrationStatus::Partial;

        let rendered_key = ObjectKey::new(Bucket::Credentials, "FEST-00007/asha.png");
        store.put(&rendered_key, b"png-bytes").await.unwrap();
        registration.credentials = vec![
            CredentialRecord {
                participant_name: "Asha Rao".to_string(),
                participant_email: "asha@example.com".to_string(),
                outcome: CredentialOutcome::Rendered {
                    key: rendered_key,
                },
            },
            CredentialRecord {
                participant_name: "Binod K".to_string(),
                participant_email: "binod@example.com".to_string(),
                outcome: CredentialOutcome::Failed {
                    message: "render exploded".to_string(),
                },
            },
        ];
        repository.save(&registration).await.unwrap();

        let service = StatusService::new(repository, store, Duration::from_secs(600));
        (dir, service, registration)
    }

    #[tokio::test]
    async fn view_surfaces_status_and_signed_refs() {
        let (_dir, service, registration) = fixture().await;
        let view = service.view(registration.id).await.unwrap().unwrap();

        assert_eq!(view.status, RegistrationStatus::Partial);
        assert_eq!(view.registration_code, "FEST-00007");
        // Only produced artifacts become refs; the failed record does not.
        assert_eq!(view.credential_refs.len(), 1);
        let r = &view.credential_refs[0];
        assert_eq!(r.participant_email, "asha@example.com");
        assert!(r.url.contains("expires="));
        assert!(r.url.contains("sig="));
        assert!(!r.placeholder);
    }

    #[tokio::test]
    async fn unknown_registration_is_none() {
        let (_dir, service, _) = fixture().await;
        assert!(service.view(RegistrationId::new()).await.unwrap().is_none());
    }

    #[test]
    fn polling_cadence_is_bounded() {
        assert_eq!(POLL_INTERVAL, Duration::from_secs(5));
        assert_eq!(MAX_POLL_ATTEMPTS, 12);
        // ~60 seconds of client-side patience.
        assert_eq!(POLL_INTERVAL * MAX_POLL_ATTEMPTS, Duration::from_secs(60));
    }
}
