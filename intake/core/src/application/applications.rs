// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application queries and cancellation
//!
//! Read paths and the applicant-initiated cancel, all restricted to the
//! caller's [`ApplicantScope`]. An application outside the scope is reported
//! as not found so its existence does not leak.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::application::{
    ApplicantScope, Application, ApplicationId, ApplicationStatus,
    ApplicationSummary, OwnerId,
};
use crate::domain::events::SubmissionEvent;
use crate::domain::repository::{
    ApplicationRepository, AssignmentRepository, ProcessingQueueRepository, RepositoryError,
    StatusHistoryRepository, StoredFileRepository,
};
use crate::domain::status_history::{StatusHistoryEntry, CANCELLED_NOTE};
use crate::domain::storage::{ObjectStore, StorageError};
use crate::domain::stored_file::FileId;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::repositories::Repositories;

/// Lifetime of a signed download URL
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

const CANCEL_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ApplicationServiceError {
    #[error("Application not found")]
    NotFound,

    #[error("File not found")]
    FileNotFound,

    #[error("Application in \"{0}\" status cannot be cancelled")]
    NotCancellable(ApplicationStatus),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Polling view of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationStatusView {
    pub status: ApplicationStatus,
    pub status_notes: Option<String>,
    pub assigned_to: Option<OwnerId>,
    pub is_assigned: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelledApplication {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDownload {
    pub file_id: FileId,
    pub file_name: String,
    pub url: String,
    pub expires_in: u64,
}

#[async_trait]
pub trait ApplicationService: Send + Sync {
    /// Summaries of the scope's applications, newest first
    async fn list(&self, scope: &ApplicantScope) -> Result<Vec<ApplicationSummary>, ApplicationServiceError>;

    async fn get(&self, scope: &ApplicantScope, id: ApplicationId) -> Result<Application, ApplicationServiceError>;

    async fn status(
        &self,
        scope: &ApplicantScope,
        id: ApplicationId,
    ) -> Result<ApplicationStatusView, ApplicationServiceError>;

    async fn cancel(
        &self,
        scope: &ApplicantScope,
        actor: OwnerId,
        id: ApplicationId,
    ) -> Result<CancelledApplication, ApplicationServiceError>;

    async fn file_download_url(
        &self,
        scope: &ApplicantScope,
        application_id: ApplicationId,
        file_id: FileId,
    ) -> Result<FileDownload, ApplicationServiceError>;
}

pub struct StandardApplicationService {
    applications: Arc<dyn ApplicationRepository>,
    files: Arc<dyn StoredFileRepository>,
    history: Arc<dyn StatusHistoryRepository>,
    processing_queue: Arc<dyn ProcessingQueueRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    store: Arc<dyn ObjectStore>,
    event_bus: EventBus,
    /// Reviewer that counts as "assigned" for demo applications
    demo_caseworker: Option<OwnerId>,
}

impl StandardApplicationService {
    pub fn new(
        repositories: &Repositories,
        store: Arc<dyn ObjectStore>,
        event_bus: EventBus,
        demo_caseworker: Option<OwnerId>,
    ) -> Self {
        Self {
            applications: repositories.applications.clone(),
            files: repositories.files.clone(),
            history: repositories.history.clone(),
            processing_queue: repositories.processing_queue.clone(),
            assignments: repositories.assignments.clone(),
            store,
            event_bus,
            demo_caseworker,
        }
    }

    async fn find(&self, scope: &ApplicantScope, id: ApplicationId) -> Result<Application, ApplicationServiceError> {
        self.applications
            .find_in_scope(id, scope)
            .await?
            .ok_or(ApplicationServiceError::NotFound)
    }
}

#[async_trait]
impl ApplicationService for StandardApplicationService {
    async fn list(&self, scope: &ApplicantScope) -> Result<Vec<ApplicationSummary>, ApplicationServiceError> {
        let applications = self.applications.list_in_scope(scope).await?;
        Ok(applications.iter().map(Application::summary).collect())
    }

    async fn get(&self, scope: &ApplicantScope, id: ApplicationId) -> Result<Application, ApplicationServiceError> {
        self.find(scope, id).await
    }

    async fn status(
        &self,
        scope: &ApplicantScope,
        id: ApplicationId,
    ) -> Result<ApplicationStatusView, ApplicationServiceError> {
        let application = self.find(scope, id).await?;
        let assigned_to = self
            .assignments
            .find_by_application(id)
            .await?
            .and_then(|a| a.reviewer_id);

        let is_assigned = match (scope.is_demo(), assigned_to) {
            (_, None) => false,
            (true, Some(reviewer)) => self.demo_caseworker == Some(reviewer),
            (false, Some(_)) => true,
        };

        Ok(ApplicationStatusView {
            status: application.status,
            status_notes: application.status_notes,
            assigned_to,
            is_assigned,
        })
    }

    async fn cancel(
        &self,
        scope: &ApplicantScope,
        actor: OwnerId,
        id: ApplicationId,
    ) -> Result<CancelledApplication, ApplicationServiceError> {
        // The submission worker may move the row while we cancel; reload and
        // retry on a lost status check instead of overwriting its write.
        let mut attempt = 1;
        let transition = loop {
            let mut application = self.find(scope, id).await?;
            let current = application.status;
            let transition = application
                .cancel(Utc::now())
                .map_err(|_| ApplicationServiceError::NotCancellable(current))?;
            match self.applications.update_status(&application, current).await {
                Ok(()) => break transition,
                Err(RepositoryError::Conflict(detail)) if attempt < CANCEL_ATTEMPTS => {
                    debug!(application_id = %id, attempt, %detail, "Application changed during cancel, retrying");
                    attempt += 1;
                }
                Err(RepositoryError::NotFound(_)) => return Err(ApplicationServiceError::NotFound),
                Err(e) => return Err(e.into()),
            }
        };

        let entry = StatusHistoryEntry::for_transition(id, &transition, actor, CANCELLED_NOTE);
        if let Err(e) = self.history.append(&entry).await {
            warn!(application_id = %id, error = %e, "Failed to record cancellation history");
        }

        match self.processing_queue.cancel_open(id).await {
            Ok(cancelled) => info!(application_id = %id, cancelled, "Application cancelled"),
            Err(e) => warn!(application_id = %id, error = %e, "Failed to cancel processing queue items"),
        }

        self.event_bus.publish(SubmissionEvent::ApplicationCancelled {
            application_id: id,
            cancelled_by: actor,
            cancelled_at: transition.at,
        });

        Ok(CancelledApplication {
            application_id: id,
            status: ApplicationStatus::Cancelled,
            message: "Application cancelled successfully",
        })
    }

    async fn file_download_url(
        &self,
        scope: &ApplicantScope,
        application_id: ApplicationId,
        file_id: FileId,
    ) -> Result<FileDownload, ApplicationServiceError> {
        self.find(scope, application_id).await?;

        let file = self
            .files
            .find_by_id(file_id)
            .await?
            .filter(|f| f.application_id == application_id && !f.is_deleted)
            .ok_or(ApplicationServiceError::FileNotFound)?;

        let url = self
            .store
            .create_signed_url(&file.storage_bucket, &file.storage_path, DOWNLOAD_URL_TTL)
            .await?;

        Ok(FileDownload {
            file_id,
            file_name: file.file_name,
            url,
            expires_in: DOWNLOAD_URL_TTL.as_secs(),
        })
    }
}
