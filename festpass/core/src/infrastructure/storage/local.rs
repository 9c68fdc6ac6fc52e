// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Object Store
//!
//! Filesystem-backed implementation of [`ObjectStore`] for single-node
//! deployments and testing. Objects live under `base_dir/<bucket>/<key>`.
//!
//! Signed URLs are minted with an HMAC-SHA256 token over the object address
//! and expiry instant; the artifact endpoint verifies the token before
//! serving bytes, so links expire and can be revoked by rotating the secret.
//!
//! **Limitations:**
//! - No multi-node sharing (objects only accessible on the local machine)
//! - No replication or high availability

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::storage::{Bucket, ObjectKey, ObjectStore, StorageError};

type HmacSha256 = Hmac<Sha256>;

/// Mints and verifies the expiring tokens embedded in artifact URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            secret: secret.into(),
            base_url,
        }
    }

    fn token(&self, key: &ObjectKey, expires_at: i64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(format!("{}:{}", key, expires_at).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build a signed URL valid for `ttl` from now.
    pub fn url(&self, key: &ObjectKey, ttl: Duration) -> String {
        let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        format!(
            "{}/artifacts/{}/{}?expires={}&sig={}",
            self.base_url,
            key.bucket,
            key.key,
            expires_at,
            self.token(key, expires_at)
        )
    }

    /// Verify a presented token, rejecting expired or tampered links.
    pub fn verify(&self, key: &ObjectKey, expires_at: i64, sig: &str) -> bool {
        if expires_at < chrono::Utc::now().timestamp() {
            return false;
        }
        let Ok(presented) = hex::decode(sig) else {
            return false;
        };
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(format!("{}:{}", key, expires_at).as_bytes());
        mac.verify_slice(&presented).is_ok()
    }
}

/// Local filesystem object store
pub struct LocalObjectStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalObjectStore {
    /// Create the store, ensuring the base directory exists and is writable.
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> Result<Self, StorageError> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::Io(format!(
                "Failed to create base directory {}: {e}",
                base_path.display()
            ))
        })?;

        let probe = base_path.join(".festpass-storage-probe");
        std::fs::write(&probe, b"probe").map_err(|e| {
            StorageError::Io(format!(
                "Base directory {} is not writable: {e}",
                base_path.display()
            ))
        })?;
        std::fs::remove_file(&probe)
            .map_err(|e| StorageError::Io(format!("Failed to clean up probe file: {e}")))?;

        Ok(Self { base_path, signer })
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Resolve an object key to a filesystem path, refusing traversal.
    fn resolve(&self, key: &ObjectKey) -> Result<PathBuf, StorageError> {
        let rel = Path::new(&key.key);
        if key.key.is_empty()
            || rel.is_absolute()
            || rel.components().any(|c| {
                matches!(
                    c,
                    std::path::Component::ParentDir | std::path::Component::RootDir
                )
            })
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key.bucket.as_str()).join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    async fn put(&self, key: &ObjectKey, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    async fn signed_url(&self, key: &ObjectKey, ttl: Duration) -> Result<String, StorageError> {
        // Only advertise objects that exist.
        let path = self.resolve(key)?;
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.signer.url(key, ttl))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let probe = self.base_path.join(".festpass-health-probe");
        tokio::fs::write(&probe, b"probe")
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let signer = UrlSigner::new(b"test-secret".to_vec(), "http://localhost:8080/");
        let store = LocalObjectStore::new(dir.path(), signer).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_dir, store) = store();
        let key = ObjectKey::new(Bucket::Photos, "asha/profile.jpg");

        store.put(&key, b"jpeg bytes").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (_dir, store) = store();
        let key = ObjectKey::new(Bucket::Photos, "nope.jpg");
        assert!(matches!(
            store.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.signed_url(&key, Duration::from_secs(60)).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, store) = store();
        for bad in ["../escape", "/absolute", ""] {
            let key = ObjectKey::new(Bucket::Photos, bad);
            assert!(matches!(
                store.put(&key, b"x").await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn signed_urls_verify_and_expire() {
        let (_dir, store) = store();
        let key = ObjectKey::new(Bucket::Credentials, "FEST-00001/asha.png");
        store.put(&key, b"png").await.unwrap();

        let url = store
            .signed_url(&key, Duration::from_secs(600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/artifacts/credentials/"));

        // Extract the query parameters back out of the minted URL.
        let query = url.split_once('?').unwrap().1;
        let mut expires = 0i64;
        let mut sig = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "sig" => sig = v.to_string(),
                _ => {}
            }
        }

        let signer = store.signer();
        assert!(signer.verify(&key, expires, &sig));
        // Tampered signature rejected.
        assert!(!signer.verify(&key, expires, "deadbeef"));
        // Expired instant rejected even with a matching token.
        let stale = chrono::Utc::now().timestamp() - 10;
        assert!(!signer.verify(&key, stale, &sig));
        // Token is bound to the object address.
        let other = ObjectKey::new(Bucket::Credentials, "FEST-00001/binod.png");
        assert!(!signer.verify(&other, expires, &sig));
    }
}
