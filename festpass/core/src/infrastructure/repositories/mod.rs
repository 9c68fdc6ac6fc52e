// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory repository implementations for development and testing.
//! PostgreSQL implementations live in [`postgres`].

pub mod postgres;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::registration::{Registration, RegistrationId, RegistrationStatus};
use crate::domain::repository::{
    RegistrationRepository, RegistrationSequence, RepositoryError, SequenceError, StatusUpdate,
};

#[derive(Default)]
pub struct InMemoryRegistrationRepository {
    registrations: RwLock<HashMap<RegistrationId, Registration>>,
}

impl InMemoryRegistrationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationRepository for InMemoryRegistrationRepository {
    async fn save(&self, registration: &Registration) -> Result<(), RepositoryError> {
        self.registrations
            .write()
            .insert(registration.id, registration.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        Ok(self.registrations.read().get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Registration>, RepositoryError> {
        Ok(self
            .registrations
            .read()
            .values()
            .find(|r| r.code.0 == code)
            .cloned())
    }

    async fn find_by_contact_email(
        &self,
        email: &str,
    ) -> Result<Vec<Registration>, RepositoryError> {
        let mut matches: Vec<Registration> = self
            .registrations
            .read()
            .values()
            .filter(|r| r.contact.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.created_at);
        Ok(matches)
    }

    async fn update_status_if(
        &self,
        id: RegistrationId,
        expected: RegistrationStatus,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut registrations = self.registrations.write();
        let registration = registrations
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        if registration.status != expected {
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
        Ok(true)
    }
}

/// Process-local atomic counter backing registration codes.
pub struct InMemoryRegistrationSequence {
    counter: AtomicU64,
}

impl InMemoryRegistrationSequence {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn starting_at(value: u64) -> Self {
        Self {
            counter: AtomicU64::new(value),
        }
    }
}

impl Default for InMemoryRegistrationSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistrationSequence for InMemoryRegistrationSequence {
    async fn next(&self) -> Result<u64, SequenceError> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registration::{ContactInfo, RegistrationCode};
    use std::sync::Arc;

    fn sample_registration(code: &str, email: &str) -> Registration {
        Registration::new(
            RegistrationCode(code.to_string()),
            ContactInfo {
                name: "Asha Rao".to_string(),
                email: email.to_string(),
                phone: None,
                organization: "MEC".to_string(),
            },
            vec![],
            None,
        )
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let repo = InMemoryRegistrationRepository::new();
        let reg = sample_registration("FEST-00001", "asha@example.com");
        repo.save(&reg).await.unwrap();

        assert!(repo.find_by_id(reg.id).await.unwrap().is_some());
        assert!(repo.find_by_code("FEST-00001").await.unwrap().is_some());
        assert!(repo.find_by_code("FEST-99999").await.unwrap().is_none());

        let by_email = repo
            .find_by_contact_email("ASHA@example.com")
            .await
            .unwrap();
        assert_eq!(by_email.len(), 1);
    }

    #[tokio::test]
    async fn conditional_update_applies_only_on_expected_status() {
        let repo = InMemoryRegistrationRepository::new();
        let mut reg = sample_registration("FEST-00002", "asha@example.com");
        reg.status = RegistrationStatus::Processing;
        repo.save(&reg).await.unwrap();

        // Wrong expectation: no-op.
        let applied = repo
            .update_status_if(
                reg.id,
                RegistrationStatus::Draft,
                StatusUpdate::to(RegistrationStatus::Processing),
            )
            .await
            .unwrap();
        assert!(!applied);

        // Matching expectation: applied.
        let applied = repo
            .update_status_if(
                reg.id,
                RegistrationStatus::Processing,
                StatusUpdate {
                    status: RegistrationStatus::Failed,
                    credentials: None,
                    enhanced_photo: None,
                    error: Some("template missing".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(applied);

        let stored = repo.find_by_id(reg.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RegistrationStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("template missing"));

        // A second terminal write against Processing no longer applies.
        let applied = repo
            .update_status_if(
                reg.id,
                RegistrationStatus::Processing,
                StatusUpdate::to(RegistrationStatus::Failed),
            )
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn sequence_is_unique_under_concurrency() {
        let seq = Arc::new(InMemoryRegistrationSequence::new());
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let seq = seq.clone();
                tokio::spawn(async move { seq.next().await.unwrap() })
            })
            .collect();

        let mut values = Vec::new();
        for task in tasks {
            values.push(task.await.unwrap());
        }
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 32);
    }
}
