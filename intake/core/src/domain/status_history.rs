// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Status History
//!
//! Append-only audit trail with one entry per application status transition.
//! Failing to append an entry never rolls back the transition it describes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Audit entry value type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::application::{ApplicationId, ApplicationStatus, OwnerId, StatusTransition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub application_id: ApplicationId,
    pub previous_status: ApplicationStatus,
    pub new_status: ApplicationStatus,
    pub changed_by: OwnerId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn for_transition(
        application_id: ApplicationId,
        transition: &StatusTransition,
        changed_by: OwnerId,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            previous_status: transition.from,
            new_status: transition.to,
            changed_by,
            notes: Some(notes.into()),
            created_at: transition.at,
        }
    }
}

/// Audit note for a successful submission
pub fn submitted_note(demo: bool) -> &'static str {
    if demo {
        "Application submitted (demo mode)"
    } else {
        "Application submitted"
    }
}

pub const CANCELLED_NOTE: &str = "Application cancelled by user";
