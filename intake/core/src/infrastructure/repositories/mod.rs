// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve applications, files and their audit trail
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresApplicationRepository** - Application rows and transformed form content
//! - **PostgresStoredFileRepository** - Upload metadata
//! - **PostgresStatusHistoryRepository** - Status transition audit trail
//! - **PostgresProcessingQueueRepository** - Fallback evaluation work items
//! - **PostgresAssignmentRepository** / **PostgresUserDirectory** - Read-only lookups
//!
//! ## In-Memory Repositories
//!
//! HashMap-backed implementations for development and tests. They keep the
//! same ordering and scoping rules as the SQL queries.

pub mod postgres_application;
pub mod postgres_assignment;
pub mod postgres_file;
pub mod postgres_processing_queue;
pub mod postgres_status_history;

pub use postgres_application::PostgresApplicationRepository;
pub use postgres_assignment::{PostgresAssignmentRepository, PostgresUserDirectory};
pub use postgres_file::PostgresStoredFileRepository;
pub use postgres_processing_queue::PostgresProcessingQueueRepository;
pub use postgres_status_history::PostgresStatusHistoryRepository;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::application::{ApplicantScope, Application, ApplicationId, ApplicationStatus};
use crate::domain::assignment::Assignment;
use crate::domain::processing_queue::{ProcessingQueueItem, QueueItemStatus};
use crate::domain::repository::{
    ApplicationRepository, AssignmentRepository, ProcessingQueueRepository, RepositoryError,
    StatusHistoryRepository, StoredFileRepository, UserDirectory,
};
use crate::domain::status_history::StatusHistoryEntry;
use crate::domain::stored_file::{FileId, StoredFile};
use crate::domain::user::UserAccount;
use crate::infrastructure::db::Database;

/// Every repository the pipeline needs, behind trait objects
#[derive(Clone)]
pub struct Repositories {
    pub applications: Arc<dyn ApplicationRepository>,
    pub files: Arc<dyn StoredFileRepository>,
    pub history: Arc<dyn StatusHistoryRepository>,
    pub processing_queue: Arc<dyn ProcessingQueueRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub users: Arc<dyn UserDirectory>,
}

impl Repositories {
    pub fn postgres(database: &Database) -> Self {
        let pool = database.get_pool().clone();
        Self {
            applications: Arc::new(PostgresApplicationRepository::new(pool.clone())),
            files: Arc::new(PostgresStoredFileRepository::new(pool.clone())),
            history: Arc::new(PostgresStatusHistoryRepository::new(pool.clone())),
            processing_queue: Arc::new(PostgresProcessingQueueRepository::new(pool.clone())),
            assignments: Arc::new(PostgresAssignmentRepository::new(pool.clone())),
            users: Arc::new(PostgresUserDirectory::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self::in_memory_with(InMemoryUserDirectory::new(), InMemoryAssignmentRepository::new())
    }

    /// In-memory set sharing pre-seeded user and assignment stores
    pub fn in_memory_with(
        users: InMemoryUserDirectory,
        assignments: InMemoryAssignmentRepository,
    ) -> Self {
        Self {
            applications: Arc::new(InMemoryApplicationRepository::new()),
            files: Arc::new(InMemoryStoredFileRepository::new()),
            history: Arc::new(InMemoryStatusHistoryRepository::new()),
            processing_queue: Arc::new(InMemoryProcessingQueueRepository::new()),
            assignments: Arc::new(assignments),
            users: Arc::new(users),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApplicationRepository {
    applications: Arc<RwLock<HashMap<ApplicationId, Application>>>,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_if(
        &self,
        id: ApplicationId,
        expected: ApplicationStatus,
        apply: impl FnOnce(&mut Application),
    ) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write();
        match applications.get_mut(&id) {
            Some(existing) if existing.status == expected => {
                apply(existing);
                Ok(())
            }
            Some(existing) => Err(RepositoryError::Conflict(format!(
                "Application {} is {}",
                id, existing.status
            ))),
            None => Err(RepositoryError::NotFound(format!("Application {}", id))),
        }
    }

    fn in_scope(&self, scope: &ApplicantScope) -> Vec<Application> {
        let applications = self.applications.read();
        let mut matching: Vec<Application> = applications
            .values()
            .filter(|app| scope.contains(app))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write();
        if applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict(format!("Application {}", application.id)));
        }
        applications.insert(application.id, application.clone());
        Ok(())
    }

    async fn save(
        &self,
        application: &Application,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError> {
        self.write_if(application.id, expected, |existing| *existing = application.clone())
    }

    async fn update_status(
        &self,
        application: &Application,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError> {
        self.write_if(application.id, expected, |existing| {
            existing.status = application.status;
            existing.status_notes = application.status_notes.clone();
            existing.status_changed_at = application.status_changed_at;
            existing.updated_at = application.updated_at;
        })
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.applications.read().get(&id).cloned())
    }

    async fn find_in_scope(
        &self,
        id: ApplicationId,
        scope: &ApplicantScope,
    ) -> Result<Option<Application>, RepositoryError> {
        let applications = self.applications.read();
        Ok(applications.get(&id).filter(|app| scope.contains(app)).cloned())
    }

    async fn find_active_in_scope(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self
            .in_scope(scope)
            .into_iter()
            .find(|app| app.status.is_active()))
    }

    async fn list_in_scope(&self, scope: &ApplicantScope) -> Result<Vec<Application>, RepositoryError> {
        Ok(self.in_scope(scope))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStoredFileRepository {
    files: Arc<RwLock<HashMap<FileId, StoredFile>>>,
}

impl InMemoryStoredFileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoredFileRepository for InMemoryStoredFileRepository {
    async fn insert(&self, file: &StoredFile) -> Result<(), RepositoryError> {
        let mut files = self.files.write();
        if files.contains_key(&file.id) || files.values().any(|f| f.storage_path == file.storage_path) {
            return Err(RepositoryError::Conflict(format!("File {}", file.storage_path)));
        }
        files.insert(file.id, file.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: FileId) -> Result<Option<StoredFile>, RepositoryError> {
        Ok(self.files.read().get(&id).cloned())
    }

    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StoredFile>, RepositoryError> {
        let files = self.files.read();
        let mut matching: Vec<StoredFile> = files
            .values()
            .filter(|f| f.application_id == application_id && !f.is_deleted)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn delete(&self, id: FileId) -> Result<(), RepositoryError> {
        self.files.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStatusHistoryRepository {
    entries: Arc<RwLock<Vec<StatusHistoryEntry>>>,
}

impl InMemoryStatusHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusHistoryRepository for InMemoryStatusHistoryRepository {
    async fn append(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.application_id == application_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProcessingQueueRepository {
    items: Arc<RwLock<Vec<ProcessingQueueItem>>>,
}

impl InMemoryProcessingQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingQueueRepository for InMemoryProcessingQueueRepository {
    async fn enqueue(&self, item: &ProcessingQueueItem) -> Result<(), RepositoryError> {
        self.items.write().push(item.clone());
        Ok(())
    }

    async fn cancel_open(&self, application_id: ApplicationId) -> Result<u64, RepositoryError> {
        let mut items = self.items.write();
        let mut cancelled = 0;
        for item in items
            .iter_mut()
            .filter(|i| i.application_id == application_id && i.status.is_open())
        {
            item.status = QueueItemStatus::Cancelled;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<ProcessingQueueItem>, RepositoryError> {
        Ok(self
            .items
            .read()
            .iter()
            .filter(|i| i.application_id == application_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAssignmentRepository {
    assignments: Arc<RwLock<HashMap<ApplicationId, Assignment>>>,
}

impl InMemoryAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assignment, as the reviewer side would
    pub fn assign(&self, assignment: Assignment) {
        self.assignments
            .write()
            .insert(assignment.application_id, assignment);
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Assignment>, RepositoryError> {
        Ok(self.assignments.read().get(&application_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserAccount>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserAccount) {
        self.users.write().insert(user.auth_id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self.users.read().get(auth_id).cloned())
    }
}
