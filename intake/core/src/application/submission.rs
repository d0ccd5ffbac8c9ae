// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Submission Orchestrator
//!
//! Drives an application from `draft` to `submitted`, or back to `draft` with
//! a `Submission failed: <detail>` note.
//!
//! The work is split in two phases:
//!
//! - [`SubmissionOrchestrator::receive`] runs on the request: validates the
//!   upload batch, rejects a duplicate active application, parses the form
//!   and inserts the draft. The caller is answered right after it.
//! - [`SubmissionOrchestrator::process`] runs detached on the submission
//!   worker (or awaited directly in tests) as a saga of named steps:
//!
//! ```text
//! MarkProcessing ─► StoreFiles ─► Transform ─► HashIdentifier ─► PersistSubmission
//!   (best-effort)   (compensated)              (best-effort)     (point of no return)
//!                                                                       │
//!              DispatchTask ◄── EnqueueFallback ◄── RecordHistory ◄─────┘
//!                             (all best-effort)
//! ```
//!
//! A failure before the point of no return removes every file the attempt
//! stored (rows, then blobs) and reverts the draft. After it, failures are
//! logged and never roll the submission back.
//!
//! Processing never returns an error: its outcome is reported through
//! [`SubmissionOutcome`], the event bus, metrics and the application row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::dispatcher::TaskDispatcher;
use crate::application::storage_gateway::StorageGateway;
use crate::domain::application::{
    ApplicantScope, Application, ApplicationId, ApplicationStatus,
};
use crate::domain::events::SubmissionEvent;
use crate::domain::form::{transform_parsed, FileIdMap, ParsedForm, RawForm, TransformError};
use crate::domain::hashing::IdentifierHasher;
use crate::domain::intake::{IntakeError, IntakePolicy, UploadedFile};
use crate::domain::processing_queue::ProcessingQueueItem;
use crate::domain::repository::{
    ApplicationRepository, ProcessingQueueRepository, RepositoryError, StatusHistoryRepository,
};
use crate::domain::status_history::{submitted_note, StatusHistoryEntry};
use crate::domain::stored_file::{FileMetadata, StoredFile, UploadField};
use crate::domain::task::MessageId;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::repositories::Repositories;

/// Status reported to the caller while the background phase runs
pub const ACCEPTED_STATUS: &str = "processing";

/// Named steps of the processing saga, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaStep {
    MarkProcessing,
    StoreFiles,
    Transform,
    HashIdentifier,
    PersistSubmission,
    RecordHistory,
    EnqueueFallback,
    DispatchTask,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::MarkProcessing => "mark_processing",
            SagaStep::StoreFiles => "store_files",
            SagaStep::Transform => "transform",
            SagaStep::HashIdentifier => "hash_identifier",
            SagaStep::PersistSubmission => "persist_submission",
            SagaStep::RecordHistory => "record_history",
            SagaStep::EnqueueFallback => "enqueue_fallback",
            SagaStep::DispatchTask => "dispatch_task",
        }
    }

    /// Whether a failure of this step is logged and skipped
    pub fn is_best_effort(&self) -> bool {
        !matches!(
            self,
            SagaStep::StoreFiles | SagaStep::Transform | SagaStep::PersistSubmission
        )
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound submission as decoded by the HTTP layer
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub scope: ApplicantScope,
    pub form: RawForm,
    pub files: Vec<UploadedFile>,
}

/// Synchronous answer to an accepted submission
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedSubmission {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

/// Work handed from the request to the background phase
#[derive(Debug, Clone)]
pub struct SubmissionJob {
    pub application_id: ApplicationId,
    pub scope: ApplicantScope,
    pub form: ParsedForm,
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Submitted { message_id: Option<MessageId> },
    /// The saga failed and the draft was reverted
    Failed { step: SagaStep, reason: String },
    /// The application left `draft` while processing; it is left untouched
    Abandoned { reason: String },
}

impl SubmissionOutcome {
    fn label(&self) -> &'static str {
        match self {
            SubmissionOutcome::Submitted { .. } => "submitted",
            SubmissionOutcome::Failed { .. } => "failed",
            SubmissionOutcome::Abandoned { .. } => "abandoned",
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("You already have an application in \"{existing_status}\" status. Please complete or cancel it before submitting a new one.")]
    Duplicate {
        existing_id: ApplicationId,
        existing_status: ApplicationStatus,
    },

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    InvalidForm(#[from] TransformError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Submission failed: {0}")]
    ProcessingFailed(String),
}

enum SagaFailure {
    Step { step: SagaStep, detail: String },
    Superseded(String),
}

impl SagaFailure {
    fn step(step: SagaStep, detail: impl fmt::Display) -> Self {
        SagaFailure::Step {
            step,
            detail: detail.to_string(),
        }
    }

    /// A conditional write that lost to another writer supersedes the
    /// attempt; anything else is a failure of `step`.
    fn from_write(step: SagaStep, error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(detail) => SagaFailure::Superseded(detail),
            RepositoryError::NotFound(_) => SagaFailure::Superseded("application no longer exists".to_string()),
            other => SagaFailure::step(step, other),
        }
    }
}

fn mode(scope: &ApplicantScope) -> &'static str {
    if scope.is_demo() {
        "demo"
    } else {
        "private"
    }
}

pub struct SubmissionOrchestrator {
    applications: Arc<dyn ApplicationRepository>,
    history: Arc<dyn StatusHistoryRepository>,
    processing_queue: Arc<dyn ProcessingQueueRepository>,
    gateway: StorageGateway,
    dispatcher: TaskDispatcher,
    hasher: Option<Arc<dyn IdentifierHasher>>,
    policy: IntakePolicy,
    event_bus: EventBus,
}

impl SubmissionOrchestrator {
    pub fn new(
        repositories: &Repositories,
        gateway: StorageGateway,
        dispatcher: TaskDispatcher,
        policy: IntakePolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            applications: repositories.applications.clone(),
            history: repositories.history.clone(),
            processing_queue: repositories.processing_queue.clone(),
            gateway,
            dispatcher,
            hasher: None,
            policy,
            event_bus,
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn IdentifierHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn policy(&self) -> &IntakePolicy {
        &self.policy
    }

    /// Synchronous phase: validate, reject duplicates and insert the draft
    pub async fn receive(
        &self,
        request: SubmissionRequest,
    ) -> Result<(AcceptedSubmission, SubmissionJob), SubmissionError> {
        let scope = request.scope;

        self.policy.validate(&request.files)?;

        if let Some(existing) = self.applications.find_active_in_scope(&scope).await? {
            info!(
                owner_id = %scope.owner_id,
                mode = mode(&scope),
                existing_application_id = %existing.id,
                existing_status = %existing.status,
                "Active application already exists"
            );
            return Err(SubmissionError::Duplicate {
                existing_id: existing.id,
                existing_status: existing.status,
            });
        }

        let form = request.form.parse()?;

        let application_id = ApplicationId::new();
        let now = Utc::now();
        let draft = Application::new_draft(application_id, &scope, now);
        self.applications.insert(&draft).await?;

        info!(
            application_id = %application_id,
            owner_id = %scope.owner_id,
            demo_session_id = ?scope.demo_session_id.map(|s| s.to_string()),
            mode = mode(&scope),
            files = request.files.len(),
            "Draft application created"
        );
        metrics::counter!("intake_submissions_received_total", "mode" => mode(&scope)).increment(1);
        self.event_bus.publish(SubmissionEvent::SubmissionReceived {
            application_id,
            owner_id: scope.owner_id,
            demo_session_id: scope.demo_session_id,
            file_count: request.files.len(),
            received_at: now,
        });

        Ok((
            AcceptedSubmission {
                application_id,
                status: ACCEPTED_STATUS,
                created_at: draft.created_at,
            },
            SubmissionJob {
                application_id,
                scope,
                form,
                files: request.files,
            },
        ))
    }

    /// Background phase: run the saga to completion
    pub async fn process(&self, job: SubmissionJob) -> SubmissionOutcome {
        let started = Instant::now();
        let application_id = job.application_id;

        info!(
            application_id = %application_id,
            mode = mode(&job.scope),
            files = job.files.len(),
            "Processing submission"
        );

        let mut stored = Vec::new();
        let outcome = match self.run_saga(&job, &mut stored).await {
            Ok(message_id) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    application_id = %application_id,
                    mode = mode(&job.scope),
                    duration_ms,
                    "Submission completed"
                );
                self.event_bus.publish(SubmissionEvent::SubmissionCompleted {
                    application_id,
                    message_id: message_id.as_ref().map(|m| m.0.clone()),
                    duration_ms,
                    completed_at: Utc::now(),
                });
                SubmissionOutcome::Submitted { message_id }
            }
            Err(SagaFailure::Step { step, detail }) => {
                error!(
                    application_id = %application_id,
                    mode = mode(&job.scope),
                    step = %step,
                    error = %detail,
                    "Submission failed"
                );
                self.compensate(application_id, &stored).await;
                self.revert(application_id, &detail).await;
                self.publish_failure(application_id, step, &detail);
                SubmissionOutcome::Failed { step, reason: detail }
            }
            Err(SagaFailure::Superseded(reason)) => {
                warn!(
                    application_id = %application_id,
                    mode = mode(&job.scope),
                    reason = %reason,
                    "Submission abandoned"
                );
                self.compensate(application_id, &stored).await;
                SubmissionOutcome::Abandoned { reason }
            }
        };

        metrics::counter!("intake_submissions_completed_total", "outcome" => outcome.label()).increment(1);
        metrics::histogram!("intake_submission_duration_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }

    /// Revert a draft whose job never reached the worker
    pub async fn abandon(&self, application_id: ApplicationId, reason: &str) {
        warn!(application_id = %application_id, reason = %reason, "Reverting unprocessed submission");
        self.revert(application_id, reason).await;
        self.publish_failure(application_id, SagaStep::MarkProcessing, reason);
        metrics::counter!("intake_submissions_completed_total", "outcome" => "failed").increment(1);
    }

    /// Legacy variant: both phases inline, answering with the submitted record
    pub async fn submit_sync(&self, request: SubmissionRequest) -> Result<Application, SubmissionError> {
        let (accepted, job) = self.receive(request).await?;

        match self.process(job).await {
            SubmissionOutcome::Submitted { .. } => self
                .applications
                .find_by_id(accepted.application_id)
                .await?
                .ok_or_else(|| SubmissionError::ProcessingFailed("application disappeared".to_string())),
            SubmissionOutcome::Failed { reason, .. } | SubmissionOutcome::Abandoned { reason } => {
                Err(SubmissionError::ProcessingFailed(reason))
            }
        }
    }

    async fn run_saga(
        &self,
        job: &SubmissionJob,
        stored: &mut Vec<StoredFile>,
    ) -> Result<Option<MessageId>, SagaFailure> {
        let application_id = job.application_id;
        let owner = job.scope.owner_id;

        // MarkProcessing
        match self.applications.find_by_id(application_id).await {
            Ok(Some(mut application)) => {
                if application.status != ApplicationStatus::Draft {
                    return Err(SagaFailure::Superseded(format!(
                        "application is {}",
                        application.status
                    )));
                }
                application.mark_processing(Utc::now());
                match self.applications.update_status(&application, ApplicationStatus::Draft).await {
                    Ok(()) => {}
                    Err(e @ (RepositoryError::Conflict(_) | RepositoryError::NotFound(_))) => {
                        return Err(SagaFailure::from_write(SagaStep::MarkProcessing, e));
                    }
                    Err(e) => {
                        warn!(application_id = %application_id, step = %SagaStep::MarkProcessing, error = %e, "Failed to annotate draft");
                    }
                }
            }
            Ok(None) => return Err(SagaFailure::Superseded("application no longer exists".to_string())),
            Err(e) => {
                warn!(application_id = %application_id, step = %SagaStep::MarkProcessing, error = %e, "Failed to load draft");
            }
        }

        // StoreFiles: single-file fields first, then arrays
        self.policy
            .validate(&job.files)
            .map_err(|e| SagaFailure::step(SagaStep::StoreFiles, e))?;

        let mut file_ids = FileIdMap::default();
        for field in UploadField::ALL {
            for upload in job.files.iter().filter(|f| f.field == field) {
                let metadata = FileMetadata::for_upload(
                    field,
                    &upload.file_name,
                    upload.correlation_key.as_deref(),
                );
                let file = self
                    .gateway
                    .store(upload, owner, application_id, metadata)
                    .await
                    .map_err(|e| SagaFailure::step(SagaStep::StoreFiles, e))?;
                file_ids.record(field, file.id, upload.correlation_key.clone());
                stored.push(file);
            }
        }
        debug!(application_id = %application_id, stored = stored.len(), "Files stored");

        // Transform
        let record = transform_parsed(&job.form, &file_ids, owner);

        // HashIdentifier
        let ssn_hash = match (&self.hasher, job.form.ssn()) {
            (Some(hasher), Some(ssn)) => match hasher.hash(&ssn).await {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!(application_id = %application_id, step = %SagaStep::HashIdentifier, error = %e, "Identifier hashing failed, continuing without hash");
                    None
                }
            },
            _ => None,
        };

        // PersistSubmission
        let mut application = match self.applications.find_by_id(application_id).await {
            Ok(Some(application)) => application,
            Ok(None) => return Err(SagaFailure::Superseded("application no longer exists".to_string())),
            Err(e) => return Err(SagaFailure::step(SagaStep::PersistSubmission, e)),
        };
        if application.status != ApplicationStatus::Draft {
            return Err(SagaFailure::Superseded(format!(
                "application is {}",
                application.status
            )));
        }
        let transition = application
            .submit(record, ssn_hash, Utc::now())
            .map_err(|e| SagaFailure::step(SagaStep::PersistSubmission, e))?;
        self.applications
            .save(&application, ApplicationStatus::Draft)
            .await
            .map_err(|e| SagaFailure::from_write(SagaStep::PersistSubmission, e))?;

        // RecordHistory
        let entry = StatusHistoryEntry::for_transition(
            application_id,
            &transition,
            owner,
            submitted_note(job.scope.is_demo()),
        );
        if let Err(e) = self.history.append(&entry).await {
            warn!(application_id = %application_id, step = %SagaStep::RecordHistory, error = %e, "Failed to record status history");
        }

        // EnqueueFallback
        let item = ProcessingQueueItem::pending(application_id, Utc::now());
        if let Err(e) = self.processing_queue.enqueue(&item).await {
            warn!(application_id = %application_id, step = %SagaStep::EnqueueFallback, error = %e, "Failed to write processing queue row");
        }

        // DispatchTask
        Ok(self.dispatcher.enqueue(application_id).await)
    }

    async fn compensate(&self, application_id: ApplicationId, stored: &[StoredFile]) {
        if stored.is_empty() {
            return;
        }
        let outcome = self.gateway.discard(stored).await;
        info!(
            application_id = %application_id,
            removed = outcome.removed,
            orphaned = outcome.orphaned,
            retained = outcome.retained,
            "Removed files of failed submission attempt"
        );
    }

    async fn revert(&self, application_id: ApplicationId, detail: &str) {
        match self.applications.find_by_id(application_id).await {
            Ok(Some(mut application)) if application.status == ApplicationStatus::Draft => {
                application.revert_to_draft(detail, Utc::now());
                match self.applications.update_status(&application, ApplicationStatus::Draft).await {
                    Ok(()) => {}
                    Err(RepositoryError::Conflict(current)) => {
                        warn!(application_id = %application_id, %current, "Application left draft, not reverting");
                    }
                    Err(e) => {
                        error!(application_id = %application_id, error = %e, "Failed to write failure note");
                    }
                }
            }
            Ok(Some(application)) => {
                warn!(
                    application_id = %application_id,
                    status = %application.status,
                    "Application left draft, not reverting"
                );
            }
            Ok(None) => warn!(application_id = %application_id, "Application to revert not found"),
            Err(e) => error!(application_id = %application_id, error = %e, "Failed to load application to revert"),
        }
    }

    fn publish_failure(&self, application_id: ApplicationId, step: SagaStep, reason: &str) {
        self.event_bus.publish(SubmissionEvent::SubmissionFailed {
            application_id,
            step: step.as_str().to_string(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        });
    }
}
