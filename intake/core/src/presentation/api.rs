// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API
//!
//! Routes under `/api/public`, `/api/private` (bearer token) and
//! `/api/demo` (demo session headers). Submissions are answered with `202`
//! as soon as the draft exists; the rest of the pipeline runs on the
//! [`SubmissionQueue`]'s worker.

use axum::{
    extract::{
        multipart::MultipartRejection, ConnectInfo, DefaultBodyLimit, FromRequestParts, Multipart,
        Path, Request, State,
    },
    http::{HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::applications::ApplicationService;
use crate::application::submission::{SubmissionOrchestrator, SubmissionRequest};
use crate::application::submission_worker::SubmissionQueue;
use crate::domain::application::{ApplicationId, OwnerId};
use crate::domain::intake::IntakePolicy;
use crate::domain::repository::{ApplicationRepository, UserDirectory};
use crate::domain::storage::ObjectStore;
use crate::domain::stored_file::FileId;
use crate::infrastructure::jwt::AccessTokenVerifier;
use crate::presentation::error::ApiError;
use crate::presentation::extract::{Applicant, AuthenticatedApplicant, DemoApplicant};
use crate::presentation::multipart::read_submission;
use crate::presentation::rate_limit::{client_ip, RateLimiters};

const ACCEPTED_MESSAGE: &str = "Application submission received and is being processed";
const SUBMITTED_MESSAGE: &str = "Application submitted successfully";

/// Shared state of every handler
pub struct AppState {
    pub orchestrator: Arc<SubmissionOrchestrator>,
    pub submissions: SubmissionQueue,
    pub applications: Arc<dyn ApplicationService>,
    pub users: Arc<dyn UserDirectory>,
    /// Absent when no token secret is configured; private routes then answer 401
    pub verifier: Option<AccessTokenVerifier>,
    pub required_role: Option<String>,
    pub demo_applicant: Option<OwnerId>,
    pub rate_limits: Arc<RateLimiters>,
    pub health: HealthProbes,
    pub cors_allowed_origins: Vec<String>,
    /// Largest request body accepted, in bytes
    pub body_limit: usize,
    pub started_at: Instant,
}

/// Dependencies probed by the health endpoints
#[derive(Clone)]
pub struct HealthProbes {
    pub database: Arc<dyn ApplicationRepository>,
    pub storage: Arc<dyn ObjectStore>,
}

/// Body limit covering the aggregate upload limit plus room for the form field
pub fn body_limit(policy: &IntakePolicy, slack_bytes: u64) -> usize {
    usize::try_from(policy.max_total_bytes.saturating_add(slack_bytes)).unwrap_or(usize::MAX)
}

pub fn app(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .route("/health/ready", get(health_ready))
        .route("/health/live", get(health_live))
        .route_layer(middleware::from_fn_with_state(state.clone(), public_rate_limit));

    let private = Router::new()
        .route(
            "/applications",
            post(submit::<AuthenticatedApplicant>).get(list::<AuthenticatedApplicant>),
        )
        .route("/applications/sync", post(submit_sync::<AuthenticatedApplicant>))
        .route("/applications/{id}", get(get_application::<AuthenticatedApplicant>))
        .route("/applications/{id}/status", get(application_status::<AuthenticatedApplicant>))
        .route("/applications/{id}/cancel", delete(cancel::<AuthenticatedApplicant>))
        .route("/applications/{id}/files/{file_id}/url", get(file_url))
        .route_layer(middleware::from_fn_with_state(state.clone(), private_rate_limit));

    let demo = Router::new()
        .route("/applications", post(submit::<DemoApplicant>).get(list::<DemoApplicant>))
        .route("/applications/{id}", get(get_application::<DemoApplicant>))
        .route("/applications/{id}/status", get(application_status::<DemoApplicant>));

    Router::new()
        .nest("/api/public", public)
        .nest("/api/private", private)
        .nest("/api/demo", demo)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.cors_allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

// ============================================================================
// Middleware
// ============================================================================

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

async fn public_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(request.headers(), peer_addr(&request));
    state.rate_limits.public_api.check(&ip)?;
    Ok(next.run(request).await)
}

async fn private_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(request.headers(), peer_addr(&request));
    state.rate_limits.private_api.check(&ip)?;
    Ok(next.run(request).await)
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Route {} {} not found", method, uri.path()))
}

// ============================================================================
// Applications
// ============================================================================

fn application_id(raw: &str) -> Result<ApplicationId, ApiError> {
    ApplicationId::from_string(raw).map_err(|_| ApiError::NotFound("Application not found".to_string()))
}

async fn submit<A>(
    State(state): State<Arc<AppState>>,
    applicant: A,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError>
where
    A: Applicant + FromRequestParts<Arc<AppState>>,
{
    let multipart = multipart.map_err(|e| ApiError::bad_request("Upload Error", e.body_text()))?;
    let body = read_submission(multipart).await?;

    let (accepted, job) = state
        .orchestrator
        .receive(SubmissionRequest {
            scope: *applicant.scope(),
            form: body.form,
            files: body.files,
        })
        .await?;

    // A job that cannot be queued reverts its own draft
    state.submissions.dispatch(job);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": ACCEPTED_MESSAGE,
            "data": accepted,
        })),
    ))
}

async fn submit_sync<A>(
    State(state): State<Arc<AppState>>,
    applicant: A,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError>
where
    A: Applicant + FromRequestParts<Arc<AppState>>,
{
    let multipart = multipart.map_err(|e| ApiError::bad_request("Upload Error", e.body_text()))?;
    let body = read_submission(multipart).await?;

    let application = state
        .orchestrator
        .submit_sync(SubmissionRequest {
            scope: *applicant.scope(),
            form: body.form,
            files: body.files,
        })
        .await?;

    info!(application_id = %application.id, "Synchronous submission completed");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": SUBMITTED_MESSAGE,
            "data": application,
        })),
    ))
}

async fn list<A>(State(state): State<Arc<AppState>>, applicant: A) -> Result<impl IntoResponse, ApiError>
where
    A: Applicant + FromRequestParts<Arc<AppState>>,
{
    let applications = state.applications.list(applicant.scope()).await?;
    Ok(Json(json!({ "success": true, "data": applications })))
}

async fn get_application<A>(
    State(state): State<Arc<AppState>>,
    applicant: A,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    A: Applicant + FromRequestParts<Arc<AppState>>,
{
    let application = state.applications.get(applicant.scope(), application_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "data": application })))
}

async fn application_status<A>(
    State(state): State<Arc<AppState>>,
    applicant: A,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    A: Applicant + FromRequestParts<Arc<AppState>>,
{
    let status = state.applications.status(applicant.scope(), application_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "data": status })))
}

async fn cancel<A>(
    State(state): State<Arc<AppState>>,
    applicant: A,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    A: Applicant + FromRequestParts<Arc<AppState>>,
{
    let cancelled = state
        .applications
        .cancel(applicant.scope(), applicant.actor(), application_id(&id)?)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": cancelled.message,
        "data": cancelled,
    })))
}

async fn file_url(
    State(state): State<Arc<AppState>>,
    applicant: AuthenticatedApplicant,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let file_id = FileId::from_string(&file_id).map_err(|_| ApiError::NotFound("File not found".to_string()))?;
    let download = state
        .applications
        .file_download_url(&applicant.scope, application_id(&id)?, file_id)
        .await?;
    Ok(Json(json!({ "success": true, "data": download })))
}

// ============================================================================
// Health
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

async fn health_detailed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (database, storage) = tokio::join!(state.health.database.ping(), state.health.storage.health_check());

    if let Err(e) = &database {
        warn!(error = %e, "Database health check failed");
    }
    if let Err(e) = &storage {
        warn!(error = %e, "Object store health check failed");
    }

    let probe = |ok: bool| if ok { "healthy" } else { "unhealthy" };
    let (code, status) = if database.is_ok() && storage.is_ok() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(json!({
            "status": status,
            "timestamp": Utc::now(),
            "uptime": state.started_at.elapsed().as_secs(),
            "services": {
                "database": probe(database.is_ok()),
                "storage": probe(storage.is_ok()),
            },
        })),
    )
}

async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.health.database.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "ready": true, "message": "Service is ready" })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "ready": false, "message": "Database connection failed" })),
            )
        }
    }
}

async fn health_live() -> impl IntoResponse {
    Json(json!({ "alive": true, "timestamp": Utc::now() }))
}
