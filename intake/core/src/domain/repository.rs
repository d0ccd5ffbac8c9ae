// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the intake pipeline: one repository per
//! aggregate or table, interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Entity | Implementations |
//! |-------|--------|----------------|
//! | `ApplicationRepository` | `Application` | `InMemoryApplicationRepository`, `PostgresApplicationRepository` |
//! | `StoredFileRepository` | `StoredFile` | `InMemoryStoredFileRepository`, `PostgresStoredFileRepository` |
//! | `StatusHistoryRepository` | `StatusHistoryEntry` | `InMemoryStatusHistoryRepository`, `PostgresStatusHistoryRepository` |
//! | `ProcessingQueueRepository` | `ProcessingQueueItem` | `InMemoryProcessingQueueRepository`, `PostgresProcessingQueueRepository` |
//! | `AssignmentRepository` | `Assignment` | `InMemoryAssignmentRepository`, `PostgresAssignmentRepository` |
//! | `UserDirectory` | `UserAccount` | `InMemoryUserDirectory`, `PostgresUserDirectory` |
//!
//! The statements are issued independently; none of these contracts spans a
//! transaction. The "one active application per scope" rule is therefore a
//! read-then-insert check and is racy under concurrent submissions.
//! Updates to an existing application are conditional on the status the
//! writer loaded, so a cancel and a submit racing on the same row cannot
//! overwrite each other.

use async_trait::async_trait;

use crate::domain::application::{Application, ApplicantScope, ApplicationId, ApplicationStatus};
use crate::domain::assignment::Assignment;
use crate::domain::processing_queue::ProcessingQueueItem;
use crate::domain::status_history::StatusHistoryEntry;
use crate::domain::stored_file::{FileId, StoredFile};
use crate::domain::user::UserAccount;

/// Connection settings for the Postgres-backed repositories
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Insert a new application; fails with `Conflict` if the id exists
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError>;

    /// Persist the full state of an existing application, but only while its
    /// stored status is still `expected`. A row that moved on in the meantime
    /// yields `Conflict` and is left untouched.
    async fn save(
        &self,
        application: &Application,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError>;

    /// Write only the status columns (status, notes, status and update
    /// timestamps), guarded by the same `expected` status check as `save`.
    /// The form record and the other columns keep whatever is stored.
    async fn update_status(
        &self,
        application: &Application,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;

    /// Find an application only if it belongs to the scope
    async fn find_in_scope(
        &self,
        id: ApplicationId,
        scope: &ApplicantScope,
    ) -> Result<Option<Application>, RepositoryError>;

    /// Newest `draft | submitted | under_review` application of the scope
    async fn find_active_in_scope(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Option<Application>, RepositoryError>;

    /// All applications of the scope, newest first
    async fn list_in_scope(&self, scope: &ApplicantScope) -> Result<Vec<Application>, RepositoryError>;

    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait StoredFileRepository: Send + Sync {
    async fn insert(&self, file: &StoredFile) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: FileId) -> Result<Option<StoredFile>, RepositoryError>;

    /// Non-deleted files of an application, oldest first
    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StoredFile>, RepositoryError>;

    /// Hard delete, used only to compensate a failed submission attempt
    async fn delete(&self, id: FileId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait StatusHistoryRepository: Send + Sync {
    async fn append(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError>;

    /// Entries of an application, oldest first
    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError>;
}

#[async_trait]
pub trait ProcessingQueueRepository: Send + Sync {
    async fn enqueue(&self, item: &ProcessingQueueItem) -> Result<(), RepositoryError>;

    /// Mark `pending | processing` items of the application as cancelled
    async fn cancel_open(&self, application_id: ApplicationId) -> Result<u64, RepositoryError>;

    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<ProcessingQueueItem>, RepositoryError>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Assignment>, RepositoryError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve the identity-provider subject to a user row
    async fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<UserAccount>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
