// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identifier Hashing
//!
//! One-way hashing of the applicant's national identifier so the clear value
//! is never stored. A hashing failure is non-fatal for a submission.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Port implemented in `crate::infrastructure::hashing`

use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait IdentifierHasher: Send + Sync {
    async fn hash(&self, identifier: &str) -> Result<String, HashingError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HashingError {
    #[error("Hashing key is invalid: {0}")]
    InvalidKey(String),

    #[error("Hashing backend failed: {0}")]
    Backend(String),
}
