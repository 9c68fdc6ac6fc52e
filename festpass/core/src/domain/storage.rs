// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Object Store Trait - Anti-Corruption Layer for Artifact Storage
//!
//! Abstraction over the blob storage backend holding uploaded photos and
//! rendered credentials. Isolates the domain from the storage technology and
//! enables testing with mocks.
//!
//! URLs handed to clients are always time-limited signed links minted per
//! request, never permanent public paths, so artifacts can be revoked and
//! regenerated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Logical buckets the pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Uploaded portraits, as received from intake.
    Photos,
    /// AI-enhanced variants of uploaded portraits.
    Enhanced,
    /// Rendered credential images.
    Credentials,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Photos => "photos",
            Bucket::Enhanced => "enhanced",
            Bucket::Credentials => "credentials",
        }
    }
}

impl std::str::FromStr for Bucket {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photos" => Ok(Bucket::Photos),
            "enhanced" => Ok(Bucket::Enhanced),
            "credentials" => Ok(Bucket::Credentials),
            other => Err(StorageError::InvalidKey(format!("unknown bucket: {other}"))),
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub bucket: Bucket,
    pub key: String,
}

impl ObjectKey {
    pub fn new(bucket: Bucket, key: impl Into<String>) -> Self {
        Self {
            bucket,
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Object store port, implemented in `crate::infrastructure::storage`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes.
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError>;

    /// Store an object, overwriting any previous version.
    async fn put(&self, key: &ObjectKey, bytes: &[u8]) -> Result<(), StorageError>;

    /// Mint a time-limited resolved URL for an object.
    async fn signed_url(&self, key: &ObjectKey, ttl: Duration) -> Result<String, StorageError>;

    /// Check the backend is reachable and writable.
    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout while communicating with storage backend")]
    Timeout,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Unknown storage error: {0}")]
    Unknown(String),
}

impl StorageError {
    /// Whether a retry can plausibly succeed. Missing objects and malformed
    /// keys are permanent; everything else is treated as a hiccup.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            StorageError::NotFound(_) | StorageError::InvalidKey(_)
        )
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout
        } else if err.is_connect() {
            StorageError::Network(err.to_string())
        } else {
            StorageError::Unknown(err.to_string())
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(err.to_string())
        } else {
            StorageError::Io(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_display_includes_bucket() {
        let key = ObjectKey::new(Bucket::Credentials, "FEST-00042/asha.png");
        assert_eq!(key.to_string(), "credentials/FEST-00042/asha.png");
    }

    #[test]
    fn bucket_parses_its_own_name() {
        for bucket in [Bucket::Photos, Bucket::Enhanced, Bucket::Credentials] {
            assert_eq!(bucket.as_str().parse::<Bucket>().unwrap(), bucket);
        }
        assert!("private".parse::<Bucket>().is_err());
    }

    #[test]
    fn transience_classification() {
        assert!(!StorageError::NotFound("x".into()).is_transient());
        assert!(!StorageError::InvalidKey("x".into()).is_transient());
        assert!(StorageError::Timeout.is_transient());
        assert!(StorageError::Network("reset".into()).is_transient());
        assert!(StorageError::Io("disk".into()).is_transient());
    }
}
