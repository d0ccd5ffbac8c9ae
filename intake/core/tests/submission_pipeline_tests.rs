// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the submission pipeline.
//!
//! Drives `SubmissionOrchestrator` end to end against in-memory adapters:
//! keyed file association, identifier hashing, best-effort dispatch, and
//! cleanup when the object store or the file table fails mid-submission.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use benefits_intake_core::application::{
    ApplicationService, SagaStep, StandardApplicationService, StorageGateway, SubmissionOrchestrator,
    SubmissionOutcome, SubmissionRequest, TaskDispatcher,
};
use benefits_intake_core::domain::application::{
    ApplicantScope, Application, ApplicationId, ApplicationStatus, OwnerId,
};
use benefits_intake_core::domain::events::SubmissionEvent;
use benefits_intake_core::domain::form::RawForm;
use benefits_intake_core::domain::hashing::IdentifierHasher;
use benefits_intake_core::domain::intake::{IntakePolicy, UploadedFile};
use benefits_intake_core::domain::repository::{ApplicationRepository, RepositoryError, StoredFileRepository};
use benefits_intake_core::domain::stored_file::{FileId, StoredFile, UploadField, APPLICATION_FILES_BUCKET};
use benefits_intake_core::infrastructure::event_bus::EventBus;
use benefits_intake_core::infrastructure::hashing::HmacIdentifierHasher;
use benefits_intake_core::infrastructure::repositories::{InMemoryApplicationRepository, Repositories};
use benefits_intake_core::infrastructure::storage::MemoryObjectStore;
use benefits_intake_core::infrastructure::task_queue::InMemoryTaskQueue;

/// File table that refuses every insert
struct RejectingFiles;

#[async_trait]
impl StoredFileRepository for RejectingFiles {
    async fn insert(&self, _file: &StoredFile) -> Result<(), RepositoryError> {
        Err(RepositoryError::Database("insert or update on table \"application_files\" violates foreign key constraint".to_string()))
    }

    async fn find_by_id(&self, _id: FileId) -> Result<Option<StoredFile>, RepositoryError> {
        Ok(None)
    }

    async fn find_by_application(&self, _application_id: ApplicationId) -> Result<Vec<StoredFile>, RepositoryError> {
        Ok(vec![])
    }

    async fn delete(&self, _id: FileId) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Hold {
    /// The full write of a submission
    Save,
    /// The status write that cancels an application
    Cancel,
}

/// Application table that parks one chosen write until the test releases it
struct HeldApplications {
    inner: InMemoryApplicationRepository,
    hold: Hold,
    held: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl HeldApplications {
    fn new(hold: Hold) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryApplicationRepository::new(),
            hold,
            held: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    async fn park(&self, hold: Hold) {
        if hold == self.hold && !self.held.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl ApplicationRepository for HeldApplications {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        self.inner.insert(application).await
    }

    async fn save(&self, application: &Application, expected: ApplicationStatus) -> Result<(), RepositoryError> {
        self.park(Hold::Save).await;
        self.inner.save(application, expected).await
    }

    async fn update_status(
        &self,
        application: &Application,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError> {
        if application.status == ApplicationStatus::Cancelled {
            self.park(Hold::Cancel).await;
        }
        self.inner.update_status(application, expected).await
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_in_scope(
        &self,
        id: ApplicationId,
        scope: &ApplicantScope,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_in_scope(id, scope).await
    }

    async fn find_active_in_scope(&self, scope: &ApplicantScope) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_active_in_scope(scope).await
    }

    async fn list_in_scope(&self, scope: &ApplicantScope) -> Result<Vec<Application>, RepositoryError> {
        self.inner.list_in_scope(scope).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct Pipeline {
    orchestrator: SubmissionOrchestrator,
    repositories: Repositories,
    store: MemoryObjectStore,
    queue: InMemoryTaskQueue,
    bus: EventBus,
}

fn pipeline_with(repositories: Repositories) -> Pipeline {
    let store = MemoryObjectStore::new();
    let queue = InMemoryTaskQueue::new();
    let bus = EventBus::new(256);
    let gateway = StorageGateway::new(
        Arc::new(store.clone()),
        repositories.files.clone(),
        bus.clone(),
        APPLICATION_FILES_BUCKET,
    );
    let orchestrator = SubmissionOrchestrator::new(
        &repositories,
        gateway,
        TaskDispatcher::new(Some(Arc::new(queue.clone()))),
        IntakePolicy::default(),
        bus.clone(),
    );
    Pipeline {
        orchestrator,
        repositories,
        store,
        queue,
        bus,
    }
}

fn pipeline() -> Pipeline {
    pipeline_with(Repositories::in_memory())
}

fn held_pipeline(hold: Hold) -> (Pipeline, Arc<HeldApplications>) {
    let applications = HeldApplications::new(hold);
    let mut repositories = Repositories::in_memory();
    repositories.applications = applications.clone();
    (pipeline_with(repositories), applications)
}

fn service(p: &Pipeline) -> StandardApplicationService {
    StandardApplicationService::new(&p.repositories, Arc::new(p.store.clone()), p.bus.clone(), None)
}

fn upload(field: UploadField, key: Option<&str>, name: &str) -> UploadedFile {
    UploadedFile {
        field,
        correlation_key: key.map(str::to_string),
        file_name: name.to_string(),
        content_type: "application/pdf".to_string(),
        bytes: Bytes::from_static(b"%PDF-1.4 test"),
    }
}

fn applicant() -> ApplicantScope {
    ApplicantScope::private(OwnerId(Uuid::new_v4()))
}

fn request(scope: ApplicantScope, form: &str, files: Vec<UploadedFile>) -> SubmissionRequest {
    SubmissionRequest {
        scope,
        form: RawForm::Text(form.to_string()),
        files,
    }
}

#[tokio::test]
async fn test_keyed_files_follow_their_form_entries() {
    let p = pipeline();
    let scope = applicant();
    let form = r#"{
        "w2_forms": [
            {"year": 2022, "file_key": "2022"},
            {"year": "2021", "file_key": "2021"},
            {"year": 2020, "file_key": "2020"}
        ],
        "evidence_documents": [
            {"document_type": "medical_record", "description": "MRI"}
        ]
    }"#;
    let files = vec![
        upload(UploadField::W2Forms, Some("2021"), "w2-2021.pdf"),
        upload(UploadField::W2Forms, Some("2022"), "w2-2022.pdf"),
        upload(UploadField::EvidenceDocuments, None, "mri.pdf"),
    ];

    let (accepted, job) = p.orchestrator.receive(request(scope, form, files)).await.unwrap();
    let outcome = p.orchestrator.process(job).await;
    assert!(matches!(outcome, SubmissionOutcome::Submitted { .. }));

    let stored = p.repositories.files.find_by_application(accepted.application_id).await.unwrap();
    assert_eq!(stored.len(), 3);
    let by_year = |year: i32| {
        stored
            .iter()
            .find(|f| f.document_year == Some(year))
            .map(|f| f.id.to_string())
            .unwrap()
    };

    let app = p.repositories.applications.find_by_id(accepted.application_id).await.unwrap().unwrap();
    let record = app.record.unwrap();

    let w2: Vec<Value> = serde_json::from_str(&record.w2_forms).unwrap();
    assert_eq!(w2.len(), 3);
    assert_eq!(w2[0]["year"], 2022);
    assert_eq!(w2[0]["file_id"], by_year(2022));
    assert_eq!(w2[1]["year"], 2021);
    assert_eq!(w2[1]["file_id"], by_year(2021));
    // No upload carried key 2020
    assert!(w2[2]["file_id"].is_null());

    let evidence: Vec<Value> = serde_json::from_str(&record.evidence_documents).unwrap();
    assert_eq!(evidence[0]["document_type"], "medical_record");
    assert!(evidence[0]["file_id"].is_string());

    assert_eq!(p.store.len(), 3);
    for file in &stored {
        assert!(p.store.get(APPLICATION_FILES_BUCKET, &file.storage_path).is_some());
        assert!(file.storage_path.starts_with(&format!("{}/{}/", scope.owner_id.0, accepted.application_id)));
    }
}

#[tokio::test]
async fn test_identifier_is_hashed_before_persisting() {
    let repositories = Repositories::in_memory();
    let hasher = Arc::new(HmacIdentifierHasher::new("test-key").unwrap());
    let mut p = pipeline_with(repositories);
    p.orchestrator = p.orchestrator.with_hasher(hasher.clone());

    let (accepted, job) = p
        .orchestrator
        .receive(request(applicant(), r#"{"ssn":"123-45-6789"}"#, vec![]))
        .await
        .unwrap();
    p.orchestrator.process(job).await;

    let app = p.repositories.applications.find_by_id(accepted.application_id).await.unwrap().unwrap();
    let expected = hasher.hash("123-45-6789").await.unwrap();
    assert_eq!(app.ssn_hash.as_deref(), Some(expected.as_str()));
    assert_ne!(expected, "123-45-6789");
}

#[tokio::test]
async fn test_dispatch_failure_keeps_submission() {
    let p = pipeline();
    p.queue.set_failing(true);

    let (accepted, job) = p.orchestrator.receive(request(applicant(), "{}", vec![])).await.unwrap();
    let outcome = p.orchestrator.process(job).await;

    assert_eq!(outcome, SubmissionOutcome::Submitted { message_id: None });
    let app = p.repositories.applications.find_by_id(accepted.application_id).await.unwrap().unwrap();
    assert_eq!(app.status, ApplicationStatus::Submitted);
    // The fallback row is written before dispatch is attempted
    let queued = p.repositories.processing_queue.find_by_application(accepted.application_id).await.unwrap();
    assert_eq!(queued.len(), 1);
}

#[tokio::test]
async fn test_metadata_failure_removes_blob_and_reverts() {
    let mut repositories = Repositories::in_memory();
    repositories.files = Arc::new(RejectingFiles);
    let p = pipeline_with(repositories);

    let (accepted, job) = p
        .orchestrator
        .receive(request(applicant(), "{}", vec![upload(UploadField::BirthCertificate, None, "birth.pdf")]))
        .await
        .unwrap();
    let outcome = p.orchestrator.process(job).await;

    assert!(matches!(outcome, SubmissionOutcome::Failed { step: SagaStep::StoreFiles, .. }));
    assert!(p.store.is_empty());

    let app = p.repositories.applications.find_by_id(accepted.application_id).await.unwrap().unwrap();
    assert_eq!(app.status, ApplicationStatus::Draft);
    let note = app.status_notes.unwrap();
    assert!(note.starts_with("Submission failed: Failed to save file record:"), "{}", note);
    assert!(p.queue.messages().is_empty());
}

#[tokio::test]
async fn test_unremovable_blob_is_reported_as_orphan() {
    let mut repositories = Repositories::in_memory();
    repositories.files = Arc::new(RejectingFiles);
    let p = pipeline_with(repositories);
    p.store.fail_removals(true);
    let mut events = p.bus.subscribe();

    let (accepted, job) = p
        .orchestrator
        .receive(request(applicant(), "{}", vec![upload(UploadField::CitizenshipProof, None, "passport.pdf")]))
        .await
        .unwrap();
    p.orchestrator.process(job).await;

    let mut orphaned = None;
    while let Ok(event) = events.try_recv() {
        if let SubmissionEvent::FileOrphaned { application_id, storage_path, .. } = event {
            orphaned = Some((application_id, storage_path));
        }
    }
    let (application_id, storage_path) = orphaned.expect("orphan event");
    assert_eq!(application_id, accepted.application_id);
    assert_eq!(p.store.paths(APPLICATION_FILES_BUCKET), vec![storage_path]);

    let app = p.repositories.applications.find_by_id(accepted.application_id).await.unwrap().unwrap();
    assert_eq!(app.status, ApplicationStatus::Draft);
}

#[tokio::test]
async fn test_reverted_draft_blocks_new_submission_until_cancelled() {
    let p = pipeline();
    let scope = applicant();
    p.store.fail_uploads_after(0);

    let (first, job) = p
        .orchestrator
        .receive(request(scope, "{}", vec![upload(UploadField::BirthCertificate, None, "b.pdf")]))
        .await
        .unwrap();
    p.orchestrator.process(job).await;

    // The reverted draft is still an active application
    let err = p.orchestrator.receive(request(scope, "{}", vec![])).await.unwrap_err();
    assert!(err.to_string().contains("\"draft\" status"), "{}", err);

    let mut app = p.repositories.applications.find_by_id(first.application_id).await.unwrap().unwrap();
    app.cancel(chrono::Utc::now()).unwrap();
    p.repositories.applications.update_status(&app, ApplicationStatus::Draft).await.unwrap();

    assert!(p.orchestrator.receive(request(scope, "{}", vec![])).await.is_ok());
}

#[tokio::test]
async fn test_rejected_batch_writes_nothing() {
    let p = pipeline();
    let scope = applicant();
    let mut gif = upload(UploadField::BirthCertificate, None, "b.exe");
    gif.content_type = "application/x-msdownload".to_string();

    assert!(p.orchestrator.receive(request(scope, "{}", vec![gif])).await.is_err());
    assert!(p.repositories.applications.list_in_scope(&scope).await.unwrap().is_empty());
    assert!(p.store.is_empty());
}

#[tokio::test]
async fn test_cancel_racing_the_submit_write_keeps_the_record() {
    let (p, applications) = held_pipeline(Hold::Cancel);
    let svc = service(&p);
    let scope = applicant();
    let form = r#"{"birthplace": "Denver", "current_step": 13}"#;

    let (accepted, job) = p
        .orchestrator
        .receive(request(scope, form, vec![upload(UploadField::BirthCertificate, None, "b.pdf")]))
        .await
        .unwrap();

    // The cancel loads the draft, then the whole submission lands before its write
    let (cancelled, outcome) = tokio::join!(svc.cancel(&scope, scope.owner_id, accepted.application_id), async {
        applications.entered.notified().await;
        let outcome = p.orchestrator.process(job).await;
        applications.release.notify_one();
        outcome
    });

    assert!(matches!(outcome, SubmissionOutcome::Submitted { .. }), "{:?}", outcome);
    assert_eq!(cancelled.unwrap().status, ApplicationStatus::Cancelled);

    let app = p.repositories.applications.find_by_id(accepted.application_id).await.unwrap().unwrap();
    assert_eq!(app.status, ApplicationStatus::Cancelled);
    assert!(app.submitted_at.is_some());
    assert_eq!(app.record.unwrap().birthplace.as_deref(), Some("Denver"));
    assert_eq!(p.repositories.files.find_by_application(accepted.application_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_processing_wins_over_the_submit_write() {
    let (p, applications) = held_pipeline(Hold::Save);
    let svc = service(&p);
    let scope = applicant();

    let (accepted, job) = p
        .orchestrator
        .receive(request(scope, "{}", vec![upload(UploadField::BirthCertificate, None, "b.pdf")]))
        .await
        .unwrap();

    // Files are stored and the submit write is parked when the cancel arrives
    let (outcome, cancelled) = tokio::join!(p.orchestrator.process(job), async {
        applications.entered.notified().await;
        let cancelled = svc.cancel(&scope, scope.owner_id, accepted.application_id).await;
        applications.release.notify_one();
        cancelled
    });

    assert_eq!(cancelled.unwrap().status, ApplicationStatus::Cancelled);
    assert!(matches!(outcome, SubmissionOutcome::Abandoned { .. }), "{:?}", outcome);

    let app = p.repositories.applications.find_by_id(accepted.application_id).await.unwrap().unwrap();
    assert_eq!(app.status, ApplicationStatus::Cancelled);
    assert!(app.record.is_none());
    assert!(app.submitted_at.is_none());
    assert!(p.store.is_empty());
    assert!(p.repositories.files.find_by_application(accepted.application_id).await.unwrap().is_empty());
    assert!(p.queue.messages().is_empty());
}
