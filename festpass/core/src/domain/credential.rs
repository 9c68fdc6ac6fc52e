// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Rendering Port
//!
//! Domain interface to the artifact generator. The compositor implementation
//! lives in `crate::infrastructure::compositor`; the worker is its only
//! consumer. `compose` is deterministic: identical inputs produce
//! layout-identical output, so regeneration for corrections is safe.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registration fields rendered onto one participant's credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFields {
    pub participant_name: String,
    pub organization: String,
    /// Display labels of the events this participant is in.
    pub events: Vec<String>,
    /// Human-readable registration code, e.g. `FEST-00042`.
    pub registration_code: String,
}

/// Payload embedded in the credential's scannable code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationPayload {
    pub id: String,
    pub name: String,
    pub events: Vec<String>,
}

impl VerificationPayload {
    pub fn from_fields(fields: &CredentialFields) -> Self {
        Self {
            id: fields.registration_code.clone(),
            name: fields.participant_name.clone(),
            events: fields.events.clone(),
        }
    }
}

/// A finished credential image.
#[derive(Debug, Clone)]
pub struct RenderedCredential {
    /// PNG-encoded image at the template's native resolution.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Whether a placeholder avatar was used instead of a photo.
    pub placeholder: bool,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    /// Mandatory asset (template, typeface) missing or unreadable. Fatal for
    /// every job; a deployment defect, not a per-registration error.
    #[error("fatal asset error: {0}")]
    FatalAsset(String),

    /// Encoding the finished canvas failed.
    #[error("failed to encode credential: {0}")]
    Encode(String),

    /// The verification payload could not be embedded.
    #[error("failed to embed verification code: {0}")]
    Embed(String),
}

/// Renderer port, implemented by the compositor.
///
/// Synchronous and CPU-bound; callers run it on a blocking thread. A missing
/// or undecodable photo is not an error: the implementation degrades that
/// participant's card to a placeholder avatar (`photo = None`).
pub trait CredentialRenderer: Send + Sync {
    fn compose(
        &self,
        fields: &CredentialFields,
        photo: Option<&[u8]>,
    ) -> Result<RenderedCredential, ComposeError>;
}
