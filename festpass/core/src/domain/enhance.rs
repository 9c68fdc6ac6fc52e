// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Enhance
//!
//! Provides enhance functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements enhance

// Photo Enhancement Domain Interface (Anti-Corruption Layer)
//
// Defines the domain interface for external AI photo enhancement following
// DDD principles. Prevents vendor lock-in by abstracting restoration APIs.
//
// Implementations in infrastructure/enhance/ directory.

use async_trait::async_trait;

/// Domain interface for AI photo enhancement providers.
///
/// Calls are time-boxed by the worker; a slow or failing provider degrades
/// the pipeline to the non-enhanced photo, it never fails the job.
#[async_trait]
pub trait PhotoEnhancer: Send + Sync {
    /// Enhance a portrait, returning the processed image bytes.
    async fn enhance(&self, photo: &[u8]) -> Result<Vec<u8>, EnhanceError>;

    /// Check if the provider is healthy and accessible.
    async fn health_check(&self) -> Result<(), EnhanceError>;

    /// Provider name for logs and selection reporting.
    fn name(&self) -> &str;
}

/// Errors that can occur during enhancement operations
#[derive(Debug, thiserror::Error)]
pub enum EnhanceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Enhancement timed out")]
    Timeout,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input image: {0}")]
    InvalidInput(String),

    #[error("No enhancement provider available")]
    Unavailable,
}

impl From<reqwest::Error> for EnhanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EnhanceError::Timeout
        } else if err.is_connect() {
            EnhanceError::Network(err.to_string())
        } else {
            EnhanceError::Provider(err.to_string())
        }
    }
}
