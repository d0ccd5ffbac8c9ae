// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Object Store
//!
//! Filesystem-backed `ObjectStore` for single-node development. Objects are
//! written to `{base_path}/{bucket}/{path}`. Signed URLs are `file://` URLs
//! carrying the expiry as a query parameter; nothing enforces it.
//!
//! **Limitations:**
//! - Files are only reachable on the local machine
//! - No replication or access control

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::domain::storage::{ObjectStore, StorageError};

pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    /// Create the store, creating and probing the base directory
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::IoError(format!(
                "Failed to create base directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let probe = base_path.join(".intake-storage-test");
        std::fs::write(&probe, b"test").map_err(|e| {
            StorageError::IoError(format!(
                "Base directory {} is not writable: {}",
                base_path.display(),
                e
            ))
        })?;
        std::fs::remove_file(&probe)?;

        Ok(Self { base_path })
    }

    /// Resolve an object key under the base directory, rejecting escapes
    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        let mut resolved = self.base_path.clone();
        for part in [bucket, path] {
            let relative = Path::new(part);
            if part.is_empty()
                || relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(StorageError::InvalidPath(format!("{}/{}", bucket, path)));
            }
            resolved.push(relative);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        _content_type: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let mut file = options.open(&target).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
            _ => StorageError::from(e),
        })?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        for path in paths {
            let target = self.resolve(bucket, path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let target = self.resolve(bucket, path)?;
        if !tokio::fs::try_exists(&target).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("file://{}?expires={}", target.display(), expires))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let metadata = tokio::fs::metadata(&self.base_path).await?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                self.base_path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_is_create_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();

        store
            .upload("bucket", "u/a/f.pdf", Bytes::from_static(b"one"), "application/pdf", false)
            .await
            .unwrap();
        let err = store
            .upload("bucket", "u/a/f.pdf", Bytes::from_static(b"two"), "application/pdf", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let content = std::fs::read(dir.path().join("bucket/u/a/f.pdf")).unwrap();
        assert_eq!(content, b"one");
    }

    #[tokio::test]
    async fn test_remove_ignores_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();
        store
            .upload("bucket", "x.png", Bytes::from_static(b"png"), "image/png", false)
            .await
            .unwrap();

        store
            .remove("bucket", &["x.png".to_string(), "missing.png".to_string()])
            .await
            .unwrap();
        assert!(!dir.path().join("bucket/x.png").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();
        let err = store
            .upload("bucket", "../outside.pdf", Bytes::new(), "application/pdf", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_signed_url_requires_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.create_signed_url("bucket", "nope.pdf", Duration::from_secs(60)).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
