// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod registration_service;
pub mod status;
pub mod worker;

// Re-export the service surface for convenience
pub use registration_service::{
    AdmissionError, RawSelection, RegistrationService, ServiceError, SubmissionReceipt,
    SubmitPayload, ValidationResult,
};
pub use status::{CredentialRef, RegistrationStatusView, StatusService};
pub use worker::{Worker, WorkerPool};
