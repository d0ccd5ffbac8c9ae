// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP surface tests.
//!
//! Builds the axum router over in-memory adapters and a running submission
//! worker, then drives it with `tower::ServiceExt::oneshot`. Private routes
//! are called with HS256 tokens minted here; demo routes with generated
//! session ids.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;
use uuid::Uuid;

use benefits_intake_core::application::{
    StandardApplicationService, StorageGateway, SubmissionOrchestrator, SubmissionWorker, TaskDispatcher,
};
use benefits_intake_core::domain::application::{ApplicationId, OwnerId};
use benefits_intake_core::domain::config::{RateLimitConfig, RateLimitRule};
use benefits_intake_core::domain::events::SubmissionEvent;
use benefits_intake_core::domain::intake::IntakePolicy;
use benefits_intake_core::domain::stored_file::APPLICATION_FILES_BUCKET;
use benefits_intake_core::domain::user::{UserAccount, APPLICANT_ROLE};
use benefits_intake_core::infrastructure::event_bus::{EventBus, EventReceiver};
use benefits_intake_core::infrastructure::jwt::AccessTokenVerifier;
use benefits_intake_core::infrastructure::repositories::{
    InMemoryAssignmentRepository, InMemoryUserDirectory, Repositories,
};
use benefits_intake_core::infrastructure::storage::MemoryObjectStore;
use benefits_intake_core::presentation::api::body_limit;
use benefits_intake_core::presentation::rate_limit::RateLimiters;
use benefits_intake_core::presentation::{app, AppState, HealthProbes};

const SECRET: &str = "test-jwt-secret";
const AUDIENCE: &str = "authenticated";
const AUTH_ID: &str = "auth-applicant-1";
const BOUNDARY: &str = "intake-test-boundary";

struct TestApp {
    router: Router,
    repositories: Repositories,
    store: MemoryObjectStore,
    bus: EventBus,
    owner: OwnerId,
}

fn relaxed_limits() -> RateLimitConfig {
    RateLimitConfig {
        submissions: RateLimitRule::new(100, 3600),
        demo_session_submissions: RateLimitRule::new(100, 3600),
        demo_ip_submissions: RateLimitRule::new(100, 3600),
        ..RateLimitConfig::default()
    }
}

fn build(limits: RateLimitConfig, demo_applicant: Option<OwnerId>, max_body: Option<usize>) -> TestApp {
    let owner = OwnerId(Uuid::new_v4());
    let users = InMemoryUserDirectory::new();
    users.insert(UserAccount {
        id: owner,
        auth_id: AUTH_ID.to_string(),
        role: APPLICANT_ROLE.to_string(),
    });
    let repositories = Repositories::in_memory_with(users, InMemoryAssignmentRepository::new());
    let store = MemoryObjectStore::new();
    let bus = EventBus::new(1024);
    let policy = IntakePolicy::default();

    let gateway = StorageGateway::new(
        Arc::new(store.clone()),
        repositories.files.clone(),
        bus.clone(),
        APPLICATION_FILES_BUCKET,
    );
    let orchestrator = Arc::new(SubmissionOrchestrator::new(
        &repositories,
        gateway,
        TaskDispatcher::disabled(),
        policy.clone(),
        bus.clone(),
    ));
    let (worker, submissions) = SubmissionWorker::new(orchestrator.clone(), 16, 4);
    Arc::new(worker).start();

    let state = AppState {
        orchestrator,
        submissions,
        applications: Arc::new(StandardApplicationService::new(
            &repositories,
            Arc::new(store.clone()),
            bus.clone(),
            None,
        )),
        users: repositories.users.clone(),
        verifier: Some(AccessTokenVerifier::new(SECRET, AUDIENCE)),
        required_role: Some(APPLICANT_ROLE.to_string()),
        demo_applicant,
        rate_limits: Arc::new(RateLimiters::from_config(&limits)),
        health: HealthProbes {
            database: repositories.applications.clone(),
            storage: Arc::new(store.clone()),
        },
        cors_allowed_origins: vec![],
        body_limit: max_body.unwrap_or_else(|| body_limit(&policy, 1024 * 1024)),
        started_at: Instant::now(),
    };

    TestApp {
        router: app(Arc::new(state)),
        repositories,
        store,
        bus,
        owner,
    }
}

fn test_app() -> TestApp {
    build(relaxed_limits(), Some(OwnerId(Uuid::new_v4())), None)
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    aud: &'a str,
    exp: i64,
}

fn token(sub: &str) -> String {
    let claims = Claims {
        sub,
        aud: AUDIENCE,
        exp: chrono::Utc::now().timestamp() + 600,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// (part name, file name, content type, bytes)
type FilePart<'a> = (&'a str, &'a str, &'a str, &'a [u8]);

fn part<'a>(name: &'a str, file_name: &'a str, content_type: &'a str, bytes: &'a [u8]) -> FilePart<'a> {
    (name, file_name, content_type, bytes)
}

fn multipart(form: Option<&str>, files: &[FilePart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(form) = form {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"formData\"\r\n\r\n{form}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn private_submit(uri: &str, bearer: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::post(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {bearer}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn private_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(AUTH_ID)))
        .body(Body::empty())
        .unwrap()
}

fn demo_request(method: &str, uri: &str, session: &str, body: Option<Vec<u8>>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-demo-mode", "true")
        .header("x-demo-session-id", session);
    match body {
        Some(body) => builder
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn wait_for_terminal(events: &mut EventReceiver, application_id: ApplicationId) -> SubmissionEvent {
    loop {
        let event = events.recv().await.unwrap();
        if event.application_id() != application_id {
            continue;
        }
        if matches!(
            event,
            SubmissionEvent::SubmissionCompleted { .. } | SubmissionEvent::SubmissionFailed { .. }
        ) {
            return event;
        }
    }
}

fn accepted_id(body: &Value) -> ApplicationId {
    ApplicationId::from_string(body["data"]["application_id"].as_str().unwrap()).unwrap()
}

// ============================================================================
// Public routes
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let t = test_app();

    let (status, body) = send(&t.router, Request::get("/api/public/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&t.router, Request::get("/api/public/health/detailed").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["services"]["database"], "healthy");
    assert_eq!(body["services"]["storage"], "healthy");

    let (status, body) = send(&t.router, Request::get("/api/public/health/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, body) = send(&t.router, Request::get("/api/public/health/live").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let t = test_app();
    let (status, body) = send(&t.router, Request::get("/api/nope").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["message"], "Route GET /api/nope not found");
}

// ============================================================================
// Private routes
// ============================================================================

#[tokio::test]
async fn test_private_routes_require_a_known_principal() {
    let t = test_app();
    let body = || multipart(Some("{}"), &[]);

    let (status, json) = send(&t.router, private_submit("/api/private/applications", None, body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "No authentication token provided");

    let (status, json) = send(&t.router, private_submit("/api/private/applications", Some("garbage"), body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid or expired token");

    let (status, json) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&token("stranger")), body()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "User role not found");
}

#[tokio::test]
async fn test_submission_is_accepted_then_completed() {
    let t = test_app();
    let mut events = t.bus.subscribe();
    let form = r#"{"birthplace":"Toledo","w2_forms":[{"year":2023,"file_key":"2023"}]}"#;
    let body = multipart(
        Some(form),
        &[
            part("birth_certificate", "birth.pdf", "application/pdf", b"%PDF-1.4"),
            part("w2_forms[2023]", "w2.png", "image/png", b"\x89PNG"),
        ],
    );

    let (status, json) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&token(AUTH_ID)), body),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "processing");

    let application_id = accepted_id(&json);
    let terminal = wait_for_terminal(&mut events, application_id).await;
    assert!(matches!(terminal, SubmissionEvent::SubmissionCompleted { .. }));
    assert_eq!(t.store.len(), 2);

    let (status, json) = send(
        &t.router,
        private_get(&format!("/api/private/applications/{}/status", application_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "submitted");
    assert_eq!(json["data"]["is_assigned"], false);

    let (status, json) = send(&t.router, private_get("/api/private/applications")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (_, json) = send(
        &t.router,
        private_get(&format!("/api/private/applications/{}", application_id)),
    )
    .await;
    assert_eq!(json["data"]["birthplace"], "Toledo");
    assert!(json["data"].get("ssn_hash").is_none());

    let files = t.repositories.files.find_by_application(application_id).await.unwrap();
    let w2 = files.iter().find(|f| f.document_year == Some(2023)).unwrap();
    let (status, json) = send(
        &t.router,
        private_get(&format!(
            "/api/private/applications/{}/files/{}/url",
            application_id, w2.id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["expires_in"], 3600);
}

#[tokio::test]
async fn test_active_application_conflicts() {
    let t = test_app();
    let mut events = t.bus.subscribe();

    let (_, first) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&token(AUTH_ID)), multipart(Some("{}"), &[])),
    )
    .await;
    let first_id = accepted_id(&first);
    wait_for_terminal(&mut events, first_id).await;

    let (status, json) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&token(AUTH_ID)), multipart(Some("{}"), &[])),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Application Already Exists");
    assert_eq!(json["existing_application_id"], first_id.to_string());
    assert_eq!(json["existing_status"], "submitted");
}

#[tokio::test]
async fn test_submission_rate_limit_per_user() {
    let t = build(RateLimitConfig::default(), None, None);

    let (status, _) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&token(AUTH_ID)), multipart(Some("{}"), &[])),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let request = private_submit("/api/private/applications", Some(&token(AUTH_ID)), multipart(Some("{}"), &[]));
    let response = t.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_rejected_requests_create_no_draft() {
    let t = test_app();
    let bearer = token(AUTH_ID);

    let (status, json) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&bearer), multipart(Some("{broken"), &[])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid form data");
    assert_eq!(json["message"], "Form data must be valid JSON");

    let (status, json) = send(
        &t.router,
        private_submit(
            "/api/private/applications",
            Some(&bearer),
            multipart(Some("{}"), &[part("birth_certificate", "b.txt", "text/plain", b"hello")]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid File Type");

    let (status, json) = send(
        &t.router,
        private_submit(
            "/api/private/applications",
            Some(&bearer),
            multipart(Some("{}"), &[part("passport_scan", "p.pdf", "application/pdf", b"%PDF")]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Upload Error");

    let (_, json) = send(&t.router, private_get("/api/private/applications")).await;
    assert!(json["data"].as_array().unwrap().is_empty());
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let t = build(relaxed_limits(), None, Some(4 * 1024));
    let large = vec![b'x'; 16 * 1024];

    let (status, _) = send(
        &t.router,
        private_submit(
            "/api/private/applications",
            Some(&token(AUTH_ID)),
            multipart(Some("{}"), &[part("birth_certificate", "b.pdf", "application/pdf", &large)]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_cancel_then_cancel_again() {
    let t = test_app();
    let mut events = t.bus.subscribe();
    let (_, json) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&token(AUTH_ID)), multipart(Some("{}"), &[])),
    )
    .await;
    let application_id = accepted_id(&json);
    wait_for_terminal(&mut events, application_id).await;

    let cancel = || {
        Request::delete(format!("/api/private/applications/{}/cancel", application_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token(AUTH_ID)))
            .body(Body::empty())
            .unwrap()
    };

    let (status, json) = send(&t.router, cancel()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Application cancelled successfully");
    assert_eq!(json["data"]["status"], "cancelled");

    let (status, json) = send(&t.router, cancel()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Cannot Cancel");

    let history = t.repositories.history.find_by_application(application_id).await.unwrap();
    assert_eq!(history.last().unwrap().changed_by, t.owner);
}

#[tokio::test]
async fn test_sync_route_returns_submitted_record() {
    let t = test_app();

    let (status, json) = send(
        &t.router,
        private_submit(
            "/api/private/applications/sync",
            Some(&token(AUTH_ID)),
            multipart(
                Some(r#"{"birthplace":"Oslo"}"#),
                &[part("citizenship_proof", "passport.jpg", "image/jpeg", b"\xff\xd8\xff")],
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["status"], "submitted");
    assert_eq!(json["data"]["birthplace"], "Oslo");
    assert!(json["data"]["citizenship_proof_file_id"].is_string());
}

#[tokio::test]
async fn test_missing_form_data_submits_an_empty_form() {
    let t = test_app();
    let mut events = t.bus.subscribe();

    let (status, json) = send(
        &t.router,
        private_submit("/api/private/applications", Some(&token(AUTH_ID)), multipart(None, &[])),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let application_id = accepted_id(&json);
    let terminal = wait_for_terminal(&mut events, application_id).await;
    assert!(matches!(terminal, SubmissionEvent::SubmissionCompleted { .. }));

    let (_, json) = send(
        &t.router,
        private_get(&format!("/api/private/applications/{}", application_id)),
    )
    .await;
    assert_eq!(json["data"]["status"], "submitted");
    assert_eq!(json["data"]["current_step"], 13);
}

// ============================================================================
// Demo routes
// ============================================================================

#[tokio::test]
async fn test_demo_headers_are_validated() {
    let t = test_app();

    let request = Request::get("/api/demo/applications").body(Body::empty()).unwrap();
    let (status, json) = send(&t.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid Demo Mode");

    let (status, json) = send(&t.router, demo_request("GET", "/api/demo/applications", "not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid Session ID");
}

#[tokio::test]
async fn test_demo_sessions_are_isolated() {
    let t = test_app();
    let mut events = t.bus.subscribe();
    let session_a = Uuid::new_v4().to_string();
    let session_b = Uuid::new_v4().to_string();

    let (status, json) = send(
        &t.router,
        demo_request("POST", "/api/demo/applications", &session_a, Some(multipart(Some("{}"), &[]))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let application_id = accepted_id(&json);
    wait_for_terminal(&mut events, application_id).await;

    let (_, json) = send(&t.router, demo_request("GET", "/api/demo/applications", &session_a, None)).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (_, json) = send(&t.router, demo_request("GET", "/api/demo/applications", &session_b, None)).await;
    assert!(json["data"].as_array().unwrap().is_empty());

    let (status, _) = send(
        &t.router,
        demo_request("GET", &format!("/api/demo/applications/{}", application_id), &session_b, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A second session of the same shared demo applicant may submit too
    let (status, _) = send(
        &t.router,
        demo_request("POST", "/api/demo/applications", &session_b, Some(multipart(Some("{}"), &[]))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_demo_requires_configured_applicant() {
    let t = build(relaxed_limits(), None, None);
    let session = Uuid::new_v4().to_string();

    let (status, json) = send(&t.router, demo_request("GET", "/api/demo/applications", &session, None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Demo Mode Unavailable");
}

#[tokio::test]
async fn test_demo_session_submission_limit() {
    let limits = RateLimitConfig {
        demo_session_submissions: RateLimitRule::new(1, 3600),
        ..relaxed_limits()
    };
    let t = build(limits, Some(OwnerId(Uuid::new_v4())), None);
    let session = Uuid::new_v4().to_string();

    let (status, _) = send(
        &t.router,
        demo_request("POST", "/api/demo/applications", &session, Some(multipart(Some("{}"), &[]))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, json) = send(
        &t.router,
        demo_request("POST", "/api/demo/applications", &session, Some(multipart(Some("{}"), &[]))),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "Rate Limit Exceeded");

    // Reads are not submissions
    let (status, _) = send(&t.router, demo_request("GET", "/api/demo/applications", &session, None)).await;
    assert_eq!(status, StatusCode::OK);
}
