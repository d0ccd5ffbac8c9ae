// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Multipart submission decoding
//!
//! Reads the `formData` text part and every file part into memory. File
//! parts are matched against the upload field catalogue by name (`field`,
//! `field[]` or `field[key]`); text parts other than `formData` are ignored.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use tracing::debug;

use crate::domain::form::RawForm;
use crate::domain::intake::{IntakeError, UploadedFile};
use crate::domain::stored_file::UploadField;
use crate::presentation::error::ApiError;

pub const FORM_DATA_FIELD: &str = "formData";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Decoded body of a submission request
#[derive(Debug)]
pub struct SubmissionBody {
    pub form: RawForm,
    pub files: Vec<UploadedFile>,
}

pub async fn read_submission(mut multipart: Multipart) -> Result<SubmissionBody, ApiError> {
    let mut form_data: Option<String> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == FORM_DATA_FIELD {
            form_data = Some(field.text().await.map_err(upload_error)?);
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            debug!(field = %name, "Ignoring text part");
            continue;
        };

        let Some((upload_field, correlation_key)) = UploadField::parse_part_name(&name) else {
            return Err(IntakeError::UnexpectedField(name).into());
        };

        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let bytes = field.bytes().await.map_err(upload_error)?;

        files.push(UploadedFile {
            field: upload_field,
            correlation_key,
            file_name,
            content_type,
            bytes,
        });
    }

    // An absent formData part parses as an empty form
    Ok(SubmissionBody {
        form: RawForm::Text(form_data.unwrap_or_default()),
        files,
    })
}

fn upload_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::bad_request("Request Too Large", "Request body exceeds the maximum upload size.");
    }
    ApiError::bad_request("Upload Error", err.body_text())
}
