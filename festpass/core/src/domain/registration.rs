// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Registration Aggregate
//!
//! The persisted record of one registrant's submission and its lifecycle.
//!
//! ## State machine
//!
//! ```text
//! Draft ──confirm──▶ Processing ──▶ Completed
//!                        │    ╲──▶ Partial ──reprocess──▶ Processing
//!                        ╰───────▶ Failed  ──reprocess──▶ Processing
//! ```
//!
//! Only three writers mutate a registration: the confirm step of the
//! registration service, the worker's terminal write, and an operator's
//! explicit reprocess. Terminal writes go through the repository's
//! conditional update so they cannot race a concurrent reprocess.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::EventCode;
use crate::domain::storage::ObjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(pub Uuid);

impl RegistrationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Human-readable registration code, e.g. `FEST-00042`.
///
/// Sequence-allocated codes are zero-padded counters; the degraded fallback
/// (sequence unavailable) is a time token plus random suffix and is logged
/// distinctly when allocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationCode(pub String);

impl std::fmt::Display for RegistrationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Draft,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl RegistrationStatus {
    /// The legal transition table. Everything not listed is rejected.
    pub fn can_transition(self, to: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, to),
            (Draft, Processing)
                | (Processing, Completed)
                | (Processing, Partial)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Partial, Processing)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RegistrationStatus::Completed | RegistrationStatus::Partial | RegistrationStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Draft => "draft",
            RegistrationStatus::Processing => "processing",
            RegistrationStatus::Completed => "completed",
            RegistrationStatus::Partial => "partial",
            RegistrationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact fields of the registering person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub organization: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Member,
}

/// Participant as submitted by the intake layer, before role assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDraft {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub photo_key: Option<ObjectKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub photo_key: Option<ObjectKey>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedEvent {
    pub code: EventCode,
    pub participants: Vec<Participant>,
}

/// Per-participant outcome of the credential pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CredentialOutcome {
    /// Full credential with the participant's photo.
    Rendered { key: ObjectKey },
    /// Credential produced with a placeholder avatar (no usable photo).
    Placeholder { key: ObjectKey },
    /// No artifact could be produced for this participant.
    Failed { message: String },
}

impl CredentialOutcome {
    pub fn artifact_key(&self) -> Option<&ObjectKey> {
        match self {
            CredentialOutcome::Rendered { key } | CredentialOutcome::Placeholder { key } => {
                Some(key)
            }
            CredentialOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub participant_name: String,
    pub participant_email: String,
    #[serde(flatten)]
    pub outcome: CredentialOutcome,
}

/// One unique person across the registration's selected events.
///
/// The same person may appear in both events of a pair; the credential
/// pipeline renders one card per person, listing every event they are in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub email: String,
    pub photo_key: Option<ObjectKey>,
    pub events: Vec<EventCode>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub code: RegistrationCode,
    pub status: RegistrationStatus,
    pub contact: ContactInfo,
    pub events: Vec<SelectedEvent>,
    /// The primary contact's uploaded portrait.
    pub profile_photo: Option<ObjectKey>,
    /// AI-enhanced variant of the profile photo, written by the worker.
    pub enhanced_photo: Option<ObjectKey>,
    pub credentials: Vec<CredentialRecord>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(
        code: RegistrationCode,
        contact: ContactInfo,
        events: Vec<SelectedEvent>,
        profile_photo: Option<ObjectKey>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RegistrationId::new(),
            code,
            status: RegistrationStatus::Draft,
            contact,
            events,
            profile_photo,
            enhanced_photo: None,
            credentials: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// All selected event codes in selection order.
    pub fn event_codes(&self) -> Vec<EventCode> {
        self.events.iter().map(|e| e.code).collect()
    }

    /// Unique participants across all selected events, grouped by email.
    ///
    /// The first occurrence wins for name and photo; the event list is the
    /// union in selection order. The entry matching the contact email is the
    /// primary and inherits the registration profile photo when their own is
    /// absent.
    pub fn roster(&self) -> Vec<RosterEntry> {
        let contact_email = self.contact.email.to_ascii_lowercase();
        let mut entries: Vec<RosterEntry> = Vec::new();
        for event in &self.events {
            for p in &event.participants {
                let position = entries
                    .iter()
                    .position(|e| e.email.eq_ignore_ascii_case(&p.email));
                match position {
                    Some(i) => {
                        let existing = &mut entries[i];
                        if !existing.events.contains(&event.code) {
                            existing.events.push(event.code);
                        }
                        if existing.photo_key.is_none() {
                            existing.photo_key = p.photo_key.clone();
                        }
                    }
                    None => {
                        let is_primary = p.email.to_ascii_lowercase() == contact_email;
                        let photo_key = p
                            .photo_key
                            .clone()
                            .or_else(|| is_primary.then(|| self.profile_photo.clone()).flatten());
                        entries.push(RosterEntry {
                            name: p.name.clone(),
                            email: p.email.clone(),
                            photo_key,
                            events: vec![event.code],
                            is_primary,
                        });
                    }
                }
            }
        }
        entries
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Derive the registration-level outcome from the per-participant records.
///
/// All rendered with a photo → `Completed`; at least one artifact produced
/// but some degraded or failed → `Partial`; nothing produced → `Failed`.
pub fn derive_status(records: &[CredentialRecord]) -> RegistrationStatus {
    let produced = records
        .iter()
        .filter(|r| r.outcome.artifact_key().is_some())
        .count();
    let rendered = records
        .iter()
        .filter(|r| matches!(r.outcome, CredentialOutcome::Rendered { .. }))
        .count();

    if produced == 0 {
        RegistrationStatus::Failed
    } else if rendered == records.len() {
        RegistrationStatus::Completed
    } else {
        RegistrationStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::EventCode;
    use crate::domain::storage::{Bucket, ObjectKey};

    fn participant(name: &str, email: &str, photo: Option<&str>) -> Participant {
        Participant {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            photo_key: photo.map(|k| ObjectKey::new(Bucket::Photos, k)),
            role: Role::Member,
        }
    }

    fn registration_with(events: Vec<SelectedEvent>) -> Registration {
        Registration::new(
            RegistrationCode("FEST-00001".to_string()),
            ContactInfo {
                name: "Asha Rao".to_string(),
                email: "asha@example.com".to_string(),
                phone: None,
                organization: "Model Engineering College".to_string(),
            },
            events,
            Some(ObjectKey::new(Bucket::Photos, "asha-profile")),
        )
    }

    #[test]
    fn transition_table_matches_the_lifecycle() {
        use RegistrationStatus::*;
        assert!(Draft.can_transition(Processing));
        assert!(Processing.can_transition(Completed));
        assert!(Processing.can_transition(Partial));
        assert!(Processing.can_transition(Failed));
        assert!(Failed.can_transition(Processing));
        assert!(Partial.can_transition(Processing));

        assert!(!Draft.can_transition(Completed));
        assert!(!Completed.can_transition(Processing));
        assert!(!Completed.can_transition(Failed));
        assert!(!Processing.can_transition(Draft));
    }

    #[test]
    fn derive_status_requires_all_rendered_for_completed() {
        let rendered = CredentialRecord {
            participant_name: "A".to_string(),
            participant_email: "a@example.com".to_string(),
            outcome: CredentialOutcome::Rendered {
                key: ObjectKey::new(Bucket::Credentials, "a"),
            },
        };
        let placeholder = CredentialRecord {
            participant_name: "B".to_string(),
            participant_email: "b@example.com".to_string(),
            outcome: CredentialOutcome::Placeholder {
                key: ObjectKey::new(Bucket::Credentials, "b"),
            },
        };
        let failed = CredentialRecord {
            participant_name: "C".to_string(),
            participant_email: "c@example.com".to_string(),
            outcome: CredentialOutcome::Failed {
                message: "boom".to_string(),
            },
        };

        assert_eq!(
            derive_status(&[rendered.clone(), rendered.clone()]),
            RegistrationStatus::Completed
        );
        assert_eq!(
            derive_status(&[rendered.clone(), placeholder.clone()]),
            RegistrationStatus::Partial
        );
        assert_eq!(
            derive_status(&[rendered.clone(), failed.clone()]),
            RegistrationStatus::Partial
        );
        assert_eq!(
            derive_status(&[failed.clone(), failed.clone()]),
            RegistrationStatus::Failed
        );
        assert_eq!(derive_status(&[]), RegistrationStatus::Failed);
    }

    #[test]
    fn roster_groups_the_same_person_across_events() {
        let reg = registration_with(vec![
            SelectedEvent {
                code: EventCode::Cricket,
                participants: vec![
                    participant("Asha Rao", "asha@example.com", None),
                    participant("Binod K", "binod@example.com", Some("binod-pic")),
                ],
            },
            SelectedEvent {
                code: EventCode::Quiz,
                participants: vec![
                    participant("Asha Rao", "ASHA@example.com", None),
                    participant("Chitra M", "chitra@example.com", None),
                ],
            },
        ]);

        let roster = reg.roster();
        assert_eq!(roster.len(), 3);

        let asha = &roster[0];
        assert!(asha.is_primary);
        assert_eq!(asha.events, vec![EventCode::Cricket, EventCode::Quiz]);
        // Primary inherits the registration profile photo.
        assert_eq!(
            asha.photo_key,
            Some(ObjectKey::new(Bucket::Photos, "asha-profile"))
        );

        let binod = &roster[1];
        assert!(!binod.is_primary);
        assert_eq!(binod.events, vec![EventCode::Cricket]);

        let chitra = &roster[2];
        assert_eq!(chitra.photo_key, None);
    }
}
