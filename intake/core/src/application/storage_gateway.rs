// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Storage Gateway Application Service
//!
//! Stores one uploaded file: the blob goes to the object store under a
//! deterministic key, then its metadata row is written. When the row cannot
//! be written the blob is removed again before the error propagates. If that
//! removal fails too, the blob is left behind as an orphan; it is logged,
//! counted and published as `FileOrphaned`, never retried.
//!
//! The gateway gives no cross-file atomicity. Callers that store a batch use
//! [`StorageGateway::discard`] to roll back what a failed attempt left.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::application::{ApplicationId, OwnerId};
use crate::domain::events::SubmissionEvent;
use crate::domain::intake::UploadedFile;
use crate::domain::repository::{RepositoryError, StoredFileRepository};
use crate::domain::storage::{ObjectStore, StorageError};
use crate::domain::stored_file::{storage_path, FileId, FileMetadata, StoredFile};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to upload file: {source}")]
    Upload {
        file_name: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to save file record: {source}")]
    Metadata {
        file_name: String,
        /// Whether the uploaded blob could not be removed again
        orphaned: bool,
        #[source]
        source: RepositoryError,
    },
}

/// Result of rolling back a set of stored files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardOutcome {
    pub removed: usize,
    pub orphaned: usize,
    /// Rows that could not be deleted; their blobs were kept with them
    pub retained: usize,
}

pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    files: Arc<dyn StoredFileRepository>,
    event_bus: EventBus,
    bucket: String,
}

impl StorageGateway {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        files: Arc<dyn StoredFileRepository>,
        event_bus: EventBus,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            files,
            event_bus,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload one file and record its metadata
    pub async fn store(
        &self,
        upload: &UploadedFile,
        owner: OwnerId,
        application_id: ApplicationId,
        metadata: FileMetadata,
    ) -> Result<StoredFile, GatewayError> {
        let file_id = FileId::new();
        let category = upload.field.category();
        let path = storage_path(owner, application_id, category, file_id, &upload.file_name);

        self.store
            .upload(
                &self.bucket,
                &path,
                Bytes::clone(&upload.bytes),
                &upload.content_type,
                false,
            )
            .await
            .map_err(|source| GatewayError::Upload {
                file_name: upload.file_name.clone(),
                source,
            })?;

        let stored = StoredFile {
            id: file_id,
            application_id,
            uploaded_by: owner,
            file_name: upload.file_name.clone(),
            file_type: upload.content_type.clone(),
            file_size: upload.bytes.len() as i64,
            storage_bucket: self.bucket.clone(),
            storage_path: path.clone(),
            category,
            description: metadata.description,
            document_year: metadata.document_year,
            is_deleted: false,
            created_at: Utc::now(),
        };

        if let Err(source) = self.files.insert(&stored).await {
            error!(
                application_id = %application_id,
                storage_path = %path,
                error = %source,
                "Failed to record file metadata, removing uploaded blob"
            );
            let orphaned = match self.store.remove(&self.bucket, std::slice::from_ref(&path)).await {
                Ok(()) => false,
                Err(remove_err) => {
                    self.record_orphan(application_id, &path, &remove_err);
                    true
                }
            };
            return Err(GatewayError::Metadata {
                file_name: upload.file_name.clone(),
                orphaned,
                source,
            });
        }

        metrics::counter!("intake_files_stored_total", "category" => category.as_str()).increment(1);
        debug!(application_id = %application_id, storage_path = %path, "Stored file");
        self.event_bus.publish(SubmissionEvent::FileStored {
            application_id,
            file_id,
            storage_path: path,
            stored_at: stored.created_at,
        });

        Ok(stored)
    }

    /// Remove files stored by a failed attempt, rows first, then blobs.
    ///
    /// A blob is only removed once its row is gone, so a row never outlives
    /// its blob. Failures are logged and reported in the outcome.
    pub async fn discard(&self, files: &[StoredFile]) -> DiscardOutcome {
        let mut outcome = DiscardOutcome::default();
        let mut released = Vec::with_capacity(files.len());

        for file in files {
            match self.files.delete(file.id).await {
                Ok(()) => released.push(file),
                Err(e) => {
                    warn!(
                        application_id = %file.application_id,
                        file_id = %file.id,
                        error = %e,
                        "Failed to delete file metadata during cleanup"
                    );
                    outcome.retained += 1;
                }
            }
        }

        if released.is_empty() {
            return outcome;
        }

        let paths: Vec<String> = released.iter().map(|f| f.storage_path.clone()).collect();
        match self.store.remove(&self.bucket, &paths).await {
            Ok(()) => outcome.removed = released.len(),
            Err(e) => {
                for file in &released {
                    self.record_orphan(file.application_id, &file.storage_path, &e);
                }
                outcome.orphaned = released.len();
            }
        }

        outcome
    }

    fn record_orphan(&self, application_id: ApplicationId, path: &str, err: &StorageError) {
        error!(
            application_id = %application_id,
            storage_path = %path,
            error = %err,
            "Blob left orphaned in object store"
        );
        metrics::counter!("intake_orphaned_blobs_total").increment(1);
        self.event_bus.publish(SubmissionEvent::FileOrphaned {
            application_id,
            storage_path: path.to_string(),
            reason: err.to_string(),
            detected_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stored_file::UploadField;
    use crate::infrastructure::repositories::InMemoryStoredFileRepository;
    use crate::infrastructure::storage::MemoryObjectStore;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct RejectingFiles;

    #[async_trait]
    impl StoredFileRepository for RejectingFiles {
        async fn insert(&self, _file: &StoredFile) -> Result<(), RepositoryError> {
            Err(RepositoryError::Database("insert rejected".to_string()))
        }
        async fn find_by_id(&self, _id: FileId) -> Result<Option<StoredFile>, RepositoryError> {
            Ok(None)
        }
        async fn find_by_application(
            &self,
            _application_id: ApplicationId,
        ) -> Result<Vec<StoredFile>, RepositoryError> {
            Ok(vec![])
        }
        async fn delete(&self, _id: FileId) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    fn upload(name: &str) -> UploadedFile {
        UploadedFile {
            field: UploadField::W2Forms,
            correlation_key: None,
            file_name: name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: Bytes::from_static(b"%PDF-1.7"),
        }
    }

    #[tokio::test]
    async fn test_store_writes_blob_then_row() {
        let store = MemoryObjectStore::new();
        let files = Arc::new(InMemoryStoredFileRepository::new());
        let gateway = StorageGateway::new(Arc::new(store.clone()), files.clone(), EventBus::new(16), "application-files");
        let owner = OwnerId(Uuid::new_v4());
        let app = ApplicationId::new();

        let stored = gateway
            .store(&upload("w2-2022.pdf"), owner, app, FileMetadata { description: None, document_year: Some(2022) })
            .await
            .unwrap();

        assert_eq!(stored.storage_path, format!("{}/{}/w2_forms/{}.pdf", owner, app, stored.id));
        assert_eq!(stored.file_size, 8);
        assert!(store.get("application-files", &stored.storage_path).is_some());
        assert_eq!(files.find_by_application(app).await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn test_metadata_failure_removes_blob() {
        let store = MemoryObjectStore::new();
        let gateway = StorageGateway::new(Arc::new(store.clone()), Arc::new(RejectingFiles), EventBus::new(16), "b");

        let err = gateway
            .store(&upload("a.pdf"), OwnerId(Uuid::new_v4()), ApplicationId::new(), FileMetadata::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Metadata { orphaned: false, .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_compensation_reports_orphan() {
        let store = MemoryObjectStore::new();
        store.fail_removals(true);
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let gateway = StorageGateway::new(Arc::new(store.clone()), Arc::new(RejectingFiles), bus, "b");

        let err = gateway
            .store(&upload("a.pdf"), OwnerId(Uuid::new_v4()), ApplicationId::new(), FileMetadata::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Metadata { orphaned: true, .. }));
        assert_eq!(store.len(), 1);
        assert!(matches!(events.try_recv().unwrap(), SubmissionEvent::FileOrphaned { .. }));
    }

    #[tokio::test]
    async fn test_discard_removes_rows_and_blobs() {
        let store = MemoryObjectStore::new();
        let files = Arc::new(InMemoryStoredFileRepository::new());
        let gateway = StorageGateway::new(Arc::new(store.clone()), files.clone(), EventBus::new(16), "b");
        let owner = OwnerId(Uuid::new_v4());
        let app = ApplicationId::new();

        let first = gateway.store(&upload("1.pdf"), owner, app, FileMetadata::default()).await.unwrap();
        let second = gateway.store(&upload("2.pdf"), owner, app, FileMetadata::default()).await.unwrap();

        let outcome = gateway.discard(&[first, second]).await;
        assert_eq!(outcome, DiscardOutcome { removed: 2, orphaned: 0, retained: 0 });
        assert!(store.is_empty());
        assert!(files.find_by_application(app).await.unwrap().is_empty());
    }
}
