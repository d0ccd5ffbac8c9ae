// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Object Store Trait - Anti-Corruption Layer for blob storage
//!
//! Isolates the pipeline from the storage vendor (Supabase Storage in
//! production, local filesystem or memory in development and tests). The
//! contract mirrors what the pipeline needs and nothing more:
//!
//! - `upload` with create-only semantics unless `overwrite` is requested
//! - `remove` of a batch of paths
//! - `create_signed_url` for time-limited downloads
//! - `health_check` for readiness probes

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload one object.
    ///
    /// With `overwrite == false` an existing object at `path` is never
    /// replaced; the call fails with `StorageError::AlreadyExists`.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), StorageError>;

    /// Remove objects; paths that do not exist are ignored
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError>;

    /// Create a URL granting read access to one object for `ttl`
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;

    /// Check backend availability
    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Errors from object store operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout while communicating with storage backend")]
    Timeout,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown storage error: {0}")]
    Unknown(String),
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

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(err.to_string()),
            std::io::ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(err.to_string()),
            _ => StorageError::IoError(err.to_string()),
        }
    }
}
