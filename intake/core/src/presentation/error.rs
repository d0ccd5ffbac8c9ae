// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP error mapping
//!
//! Every failure leaves the service as `{"error": <title>, "message": <text>}`
//! with the status code of its class. Server-side failures are logged here and
//! answered with a generic message.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::error;

use crate::application::applications::ApplicationServiceError;
use crate::application::submission::SubmissionError;
use crate::domain::application::{ApplicationId, ApplicationStatus};
use crate::domain::intake::IntakeError;
use crate::domain::repository::RepositoryError;
use crate::domain::storage::StorageError;
use crate::domain::form::TransformError;

const UNEXPECTED: &str = "An unexpected error occurred";

#[derive(Debug)]
pub enum ApiError {
    BadRequest { error: &'static str, message: String },
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict {
        message: String,
        existing_id: ApplicationId,
        existing_status: ApplicationStatus,
    },
    TooManyRequests { message: String, retry_after_secs: u64 },
    Internal { error: &'static str, message: String },
}

impl ApiError {
    pub fn bad_request(error: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            error,
            message: message.into(),
        }
    }

    pub fn internal(error: &'static str, message: impl Into<String>) -> Self {
        ApiError::Internal {
            error,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        match self {
            ApiError::BadRequest { error, message } => json!({ "error": error, "message": message }),
            ApiError::Unauthorized(message) => json!({ "error": "Unauthorized", "message": message }),
            ApiError::Forbidden(message) => json!({ "error": "Forbidden", "message": message }),
            ApiError::NotFound(message) => json!({ "error": "Not Found", "message": message }),
            ApiError::Conflict {
                message,
                existing_id,
                existing_status,
            } => json!({
                "error": "Application Already Exists",
                "message": message,
                "existing_application_id": existing_id,
                "existing_status": existing_status,
            }),
            ApiError::TooManyRequests { message, .. } => json!({ "error": "Rate Limit Exceeded", "message": message }),
            ApiError::Internal { error, message } => json!({ "error": error, "message": message }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let ApiError::TooManyRequests { retry_after_secs, .. } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        let title = match err {
            IntakeError::InvalidFileType { .. } => "Invalid File Type",
            IntakeError::FileTooLarge { .. } => "File Too Large",
            IntakeError::RequestTooLarge { .. } => "Request Too Large",
            IntakeError::TooManyFiles { .. } | IntakeError::TooManyForField { .. } => "Too Many Files",
            IntakeError::UnexpectedField(_) => "Upload Error",
        };
        ApiError::bad_request(title, err.to_string())
    }
}

impl From<TransformError> for ApiError {
    fn from(_: TransformError) -> Self {
        ApiError::bad_request("Invalid form data", "Form data must be valid JSON")
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        error!(error = %err, "Repository failure while handling request");
        ApiError::internal("Internal Server Error", UNEXPECTED)
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Duplicate {
                existing_id,
                existing_status,
            } => ApiError::Conflict {
                message: err.to_string(),
                existing_id,
                existing_status,
            },
            SubmissionError::Intake(e) => e.into(),
            SubmissionError::InvalidForm(e) => e.into(),
            SubmissionError::Repository(e) => e.into(),
            SubmissionError::ProcessingFailed(reason) => {
                error!(reason = %reason, "Synchronous submission failed");
                ApiError::internal("Submission Failed", format!("Submission failed: {}", reason))
            }
        }
    }
}

impl From<ApplicationServiceError> for ApiError {
    fn from(err: ApplicationServiceError) -> Self {
        match err {
            ApplicationServiceError::NotFound => ApiError::NotFound("Application not found".to_string()),
            ApplicationServiceError::FileNotFound => ApiError::NotFound("File not found".to_string()),
            ApplicationServiceError::NotCancellable(_) => ApiError::bad_request("Cannot Cancel", err.to_string()),
            ApplicationServiceError::Repository(e) => e.into(),
            ApplicationServiceError::Storage(StorageError::NotFound(_)) => {
                ApiError::NotFound("File not found".to_string())
            }
            ApplicationServiceError::Storage(e) => {
                error!(error = %e, "Object store failure while handling request");
                ApiError::internal("Internal Server Error", UNEXPECTED)
            }
        }
    }
}
