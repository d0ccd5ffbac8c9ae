// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # File Intake Validator
//!
//! Pure validation of an upload batch against the intake policy. Runs before
//! any blob is written, so a rejected request never leaves partial uploads.
//!
//! Checks run in a fixed order and the first failing check wins:
//!
//! 1. field catalogue and per-field part counts
//! 2. total part count
//! 3. declared MIME type against the allow-list
//! 4. per-file size (every offending filename is reported)
//! 5. aggregate size
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Fail-fast request validation, no side effects

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::stored_file::UploadField;

pub const MIB: u64 = 1024 * 1024;

/// Limits applied to every submission batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakePolicy {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_files: usize,
    pub allowed_content_types: Vec<String>,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * MIB,
            max_total_bytes: 100 * MIB,
            max_files: 50,
            allowed_content_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
            ],
        }
    }
}

/// One file part received with the submission, held in memory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: UploadField,
    /// Bracketed key of the multipart part name (`w2_forms[2021]` → `2021`)
    pub correlation_key: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Invalid file type: {content_type}. Only PDF and images are allowed.")]
    InvalidFileType { file_name: String, content_type: String },

    #[error("The following file(s) exceed the {limit_mib}MB limit: {}", join_names(.files))]
    FileTooLarge { files: Vec<String>, limit_mib: u64 },

    #[error("Total upload size ({}MB) exceeds the {limit_mib}MB limit.", format_mib(.total_bytes))]
    RequestTooLarge { total_bytes: u64, limit_mib: u64 },

    #[error("Number of files exceeds the allowed limit of {limit}.")]
    TooManyFiles { limit: usize },

    #[error("Too many files for field {field}: at most {limit} allowed.")]
    TooManyForField { field: UploadField, limit: usize },

    #[error("Unexpected file field: {0}")]
    UnexpectedField(String),
}

fn join_names(files: &[String]) -> String {
    files.join(", ")
}

fn format_mib(bytes: &u64) -> String {
    format!("{:.2}", *bytes as f64 / MIB as f64)
}

impl IntakePolicy {
    pub fn is_allowed_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();
        self.allowed_content_types.iter().any(|allowed| allowed == &essence)
    }

    /// Validate a whole batch; a file exactly at a limit passes
    pub fn validate(&self, files: &[UploadedFile]) -> Result<(), IntakeError> {
        let mut per_field: HashMap<UploadField, usize> = HashMap::new();
        for file in files {
            let count = per_field.entry(file.field).or_insert(0);
            *count += 1;
            if *count > file.field.max_count() {
                return Err(IntakeError::TooManyForField {
                    field: file.field,
                    limit: file.field.max_count(),
                });
            }
        }

        if files.len() > self.max_files {
            return Err(IntakeError::TooManyFiles { limit: self.max_files });
        }

        if let Some(file) = files.iter().find(|f| !self.is_allowed_type(&f.content_type)) {
            return Err(IntakeError::InvalidFileType {
                file_name: file.file_name.clone(),
                content_type: file.content_type.clone(),
            });
        }

        let oversized: Vec<String> = files
            .iter()
            .filter(|f| f.size() > self.max_file_bytes)
            .map(|f| f.file_name.clone())
            .collect();
        if !oversized.is_empty() {
            return Err(IntakeError::FileTooLarge {
                files: oversized,
                limit_mib: self.max_file_bytes / MIB,
            });
        }

        let total_bytes: u64 = files.iter().map(UploadedFile::size).sum();
        if total_bytes > self.max_total_bytes {
            return Err(IntakeError::RequestTooLarge {
                total_bytes,
                limit_mib: self.max_total_bytes / MIB,
            });
        }

        Ok(())
    }
}
