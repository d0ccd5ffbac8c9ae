// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Applicant extractors
//!
//! Resolve the [`ApplicantScope`] a request acts in. Private routes take it
//! from a verified bearer token and the caller's user row; demo routes take
//! it from the demo headers and the configured demo applicant. Both run
//! before the request body is read.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::domain::application::{ApplicantScope, DemoSessionId, OwnerId};
use crate::infrastructure::jwt::{bearer_token, TokenError};
use crate::presentation::api::AppState;
use crate::presentation::error::ApiError;
use crate::presentation::rate_limit::client_ip;

pub const DEMO_MODE_HEADER: &str = "x-demo-mode";
pub const DEMO_SESSION_HEADER: &str = "x-demo-session-id";

/// Whoever a handler acts for
pub trait Applicant: Send {
    fn scope(&self) -> &ApplicantScope;

    /// User recorded as the author of status changes
    fn actor(&self) -> OwnerId {
        self.scope().owner_id
    }
}

/// Caller authenticated with an identity-provider access token
#[derive(Debug, Clone)]
pub struct AuthenticatedApplicant {
    pub scope: ApplicantScope,
    pub auth_id: String,
}

impl Applicant for AuthenticatedApplicant {
    fn scope(&self) -> &ApplicantScope {
        &self.scope
    }
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedApplicant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(verifier) = state.verifier.as_ref() else {
            error!("Access token secret is not configured; rejecting authenticated request");
            return Err(ApiError::Unauthorized("Invalid or expired token".to_string()));
        };

        let claims = bearer_token(header)
            .and_then(|token| verifier.verify(token))
            .map_err(|e| match e {
                TokenError::Missing => ApiError::Unauthorized("No authentication token provided".to_string()),
                other => {
                    debug!(error = %other, "Rejected access token");
                    ApiError::Unauthorized("Invalid or expired token".to_string())
                }
            })?;

        let user = state
            .users
            .find_by_auth_id(&claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(auth_id = %claims.sub, "No user row for authenticated principal");
                ApiError::Forbidden("User role not found".to_string())
            })?;

        if let Some(required) = state.required_role.as_deref() {
            if user.role != required {
                warn!(auth_id = %claims.sub, role = %user.role, "Principal lacks required role");
                return Err(ApiError::Forbidden("Insufficient permissions".to_string()));
            }
        }

        if parts.method == Method::POST {
            state.rate_limits.submissions.check(&user.id.to_string())?;
        }

        Ok(Self {
            scope: ApplicantScope::private(user.id),
            auth_id: claims.sub,
        })
    }
}

/// Anonymous demo visitor isolated by its session id
#[derive(Debug, Clone)]
pub struct DemoApplicant {
    pub scope: ApplicantScope,
    pub session: DemoSessionId,
}

impl Applicant for DemoApplicant {
    fn scope(&self) -> &ApplicantScope {
        &self.scope
    }
}

impl FromRequestParts<Arc<AppState>> for DemoApplicant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let session = demo_session(&parts.headers)?;
        let session_key = session.to_string();

        state.rate_limits.demo_api.check(&session_key)?;

        if parts.method == Method::POST {
            state.rate_limits.demo_session_submissions.check(&session_key)?;
            let peer = parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            state
                .rate_limits
                .demo_ip_submissions
                .check(&client_ip(&parts.headers, peer))?;
        }

        let Some(owner_id) = state.demo_applicant else {
            error!("Demo applicant user id is not configured");
            return Err(ApiError::internal(
                "Demo Mode Unavailable",
                "Demo mode is not properly configured",
            ));
        };

        Ok(Self {
            scope: ApplicantScope::demo(owner_id, session),
            session,
        })
    }
}

/// Validate the demo headers, in the order clients are told about them
fn demo_session(headers: &HeaderMap) -> Result<DemoSessionId, ApiError> {
    let mode = headers.get(DEMO_MODE_HEADER).and_then(|v| v.to_str().ok());
    if mode != Some("true") {
        return Err(ApiError::bad_request(
            "Invalid Demo Mode",
            "X-Demo-Mode header must be exactly \"true\"",
        ));
    }

    let session = headers
        .get(DEMO_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing Session ID", "X-Demo-Session-Id header is required"))?;

    DemoSessionId::parse(session)
        .map_err(|_| ApiError::bad_request("Invalid Session ID", "X-Demo-Session-Id must be a valid UUID v4"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(mode: Option<&'static str>, session: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(mode) = mode {
            headers.insert(DEMO_MODE_HEADER, HeaderValue::from_static(mode));
        }
        if let Some(session) = session {
            headers.insert(DEMO_SESSION_HEADER, HeaderValue::from_static(session));
        }
        headers
    }

    fn title(err: ApiError) -> &'static str {
        match err {
            ApiError::BadRequest { error, .. } => error,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_demo_headers_are_checked_in_order() {
        let v4 = "0b9f6a8e-3f0c-4d9a-9a51-0a4b8f6f2c11";

        assert_eq!(title(demo_session(&headers(None, Some(v4))).unwrap_err()), "Invalid Demo Mode");
        assert_eq!(title(demo_session(&headers(Some("TRUE"), Some(v4))).unwrap_err()), "Invalid Demo Mode");
        assert_eq!(title(demo_session(&headers(Some("true"), None)).unwrap_err()), "Missing Session ID");
        assert_eq!(
            title(demo_session(&headers(Some("true"), Some("not-a-uuid"))).unwrap_err()),
            "Invalid Session ID"
        );
        // Version 1 UUIDs are refused
        assert_eq!(
            title(demo_session(&headers(Some("true"), Some("6ba7b810-9dad-11d1-80b4-00c04fd430c8"))).unwrap_err()),
            "Invalid Session ID"
        );

        let session = demo_session(&headers(Some("true"), Some(v4))).unwrap();
        assert_eq!(session.to_string(), v4);
    }
}
