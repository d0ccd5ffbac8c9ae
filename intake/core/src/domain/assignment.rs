// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Assigned Applications
//!
//! Read-only view of the caseworker assignment of an application. Rows are
//! produced by the caseworker side; the intake service only reads the
//! reviewer to answer status polls.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Assignment projection consumed by status queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::application::{ApplicationId, OwnerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub application_id: ApplicationId,
    pub reviewer_id: Option<OwnerId>,
    pub review_status: Option<String>,
    pub recommendation: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}
