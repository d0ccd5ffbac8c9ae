// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Object Store
//!
//! `DashMap`-backed `ObjectStore` for tests and throwaway development
//! servers. Failures can be injected to exercise compensation paths.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::storage::{ObjectStore, StorageError};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<(String, String), StoredObject>>,
    /// Uploads still allowed before every further upload fails
    upload_budget: Arc<AtomicUsize>,
    uploads_limited: Arc<AtomicBool>,
    fail_removals: Arc<AtomicBool>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `successful` more uploads through, then fail the rest
    pub fn fail_uploads_after(&self, successful: usize) {
        self.upload_budget.store(successful, Ordering::SeqCst);
        self.uploads_limited.store(true, Ordering::SeqCst);
    }

    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        paths.sort();
        paths
    }

    fn take_upload_permit(&self) -> bool {
        if !self.uploads_limited.load(Ordering::SeqCst) {
            return true;
        }
        self.upload_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        if !self.take_upload_permit() {
            return Err(StorageError::Unavailable("injected upload failure".to_string()));
        }

        let key = (bucket.to_string(), path.to_string());
        if !overwrite && self.objects.contains_key(&key) {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        self.objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected remove failure".to_string()));
        }
        for path in paths {
            self.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        if !self.objects.contains_key(&(bucket.to_string(), path.to_string())) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(format!("memory://{}/{}?expires_in={}", bucket, path, ttl.as_secs()))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
