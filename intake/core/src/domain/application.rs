// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Aggregate
//!
//! The central entity of the intake pipeline. An application is created as a
//! `draft` when the submission request is received, filled in by the
//! submission orchestrator, and moved to `submitted` (or back to `draft` with
//! a failure note). Caseworkers later move it to `under_review`; applicants
//! may cancel it while it is still active.
//!
//! ```text
//!            submit()                 (caseworker side)
//!   Draft ─────────────► Submitted ───────────────► UnderReview
//!     ▲  │                   │                          │
//!     │  │ revert_to_draft() │ cancel()                 │ cancel()
//!     └──┘                   ▼                          ▼
//!                        Cancelled ◄────────────────────┘
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Owns the status state machine and the applicant scope rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::form::ApplicationRecord;

/// Note written while the background worker is processing a submission.
pub const PROCESSING_NOTE: &str = "Processing submission...";

/// Prefix of every note written when a submission attempt is reverted.
pub const FAILURE_NOTE_PREFIX: &str = "Submission failed";

// ============================================================================
// Value Objects
// ============================================================================

/// Unique identifier for an application, generated before any persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Database id of a user (applicant, caseworker or the shared demo accounts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-generated demo session identifier.
///
/// Only RFC 4122 version 4 UUIDs are accepted, so a session id cannot be
/// guessed from timestamps or MAC addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DemoSessionId(Uuid);

impl DemoSessionId {
    pub fn parse(value: &str) -> Result<Self, ApplicationError> {
        let uuid = Uuid::parse_str(value.trim())
            .map_err(|_| ApplicationError::InvalidSessionId(value.to_string()))?;
        if uuid.get_version_num() != 4 || uuid.get_variant() != uuid::Variant::RFC4122 {
            return Err(ApplicationError::InvalidSessionId(value.to_string()));
        }
        Ok(Self(uuid))
    }

    /// Rehydrate a session id that was validated before it was persisted
    pub fn from_stored(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DemoSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The (owner, isolation scope) pair that partitions applications.
///
/// Authenticated applicants have no session; every demo visitor shares the
/// configured demo applicant and is isolated by its session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApplicantScope {
    pub owner_id: OwnerId,
    pub demo_session_id: Option<DemoSessionId>,
}

impl ApplicantScope {
    pub fn private(owner_id: OwnerId) -> Self {
        Self { owner_id, demo_session_id: None }
    }

    pub fn demo(owner_id: OwnerId, session: DemoSessionId) -> Self {
        Self { owner_id, demo_session_id: Some(session) }
    }

    pub fn is_demo(&self) -> bool {
        self.demo_session_id.is_some()
    }

    /// Whether the application is visible to this scope
    pub fn contains(&self, application: &Application) -> bool {
        application.applicant_id == self.owner_id
            && application.demo_session_id == self.demo_session_id
    }
}

/// Lifecycle status stored on the application row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Cancelled,
}

impl ApplicationStatus {
    /// Statuses that block a new submission from the same scope
    pub const ACTIVE: [ApplicationStatus; 3] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ApplicationStatus::Draft),
            "submitted" => Ok(ApplicationStatus::Submitted),
            "under_review" => Ok(ApplicationStatus::UnderReview),
            "cancelled" => Ok(ApplicationStatus::Cancelled),
            other => Err(ApplicationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A status change produced by the aggregate, recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Aggregate Root
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: OwnerId,
    pub demo_session_id: Option<DemoSessionId>,
    pub status: ApplicationStatus,
    pub status_notes: Option<String>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_step: Option<i32>,
    /// One-way hash of the applicant's national identifier, never rendered
    #[serde(skip_serializing)]
    pub ssn_hash: Option<String>,
    /// Transformed form content; absent until the first successful submission
    #[serde(flatten)]
    pub record: Option<ApplicationRecord>,
}

/// Row shape returned by the list endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub status: ApplicationStatus,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_step: Option<i32>,
}

impl Application {
    /// Create the draft row written synchronously when a submission arrives
    pub fn new_draft(id: ApplicationId, scope: &ApplicantScope, now: DateTime<Utc>) -> Self {
        Self {
            id,
            applicant_id: scope.owner_id,
            demo_session_id: scope.demo_session_id,
            status: ApplicationStatus::Draft,
            status_notes: None,
            status_changed_at: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
            current_step: None,
            ssn_hash: None,
            record: None,
        }
    }

    pub fn scope(&self) -> ApplicantScope {
        ApplicantScope {
            owner_id: self.applicant_id,
            demo_session_id: self.demo_session_id,
        }
    }

    /// Annotate the draft while the background worker runs
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status_notes = Some(PROCESSING_NOTE.to_string());
        self.updated_at = now;
    }

    /// Move the draft to `submitted` with its transformed content.
    ///
    /// Clears the processing note and stamps both the submission and the
    /// status-change timestamps.
    pub fn submit(
        &mut self,
        record: ApplicationRecord,
        ssn_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StatusTransition, ApplicationError> {
        if self.status != ApplicationStatus::Draft {
            return Err(ApplicationError::InvalidTransition {
                from: self.status,
                to: ApplicationStatus::Submitted,
            });
        }

        self.current_step = Some(record.current_step);
        self.record = Some(record);
        if ssn_hash.is_some() {
            self.ssn_hash = ssn_hash;
        }
        self.status = ApplicationStatus::Submitted;
        self.status_notes = None;
        self.submitted_at = Some(now);
        self.status_changed_at = Some(now);
        self.updated_at = now;

        Ok(StatusTransition {
            from: ApplicationStatus::Draft,
            to: ApplicationStatus::Submitted,
            at: now,
        })
    }

    /// Put the application back into `draft` with a `Submission failed` note
    pub fn revert_to_draft(&mut self, detail: &str, now: DateTime<Utc>) {
        self.status = ApplicationStatus::Draft;
        self.status_notes = Some(format!("{}: {}", FAILURE_NOTE_PREFIX, detail));
        self.updated_at = now;
    }

    /// Applicant-initiated cancellation of an active application
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<StatusTransition, ApplicationError> {
        if !self.status.is_active() {
            return Err(ApplicationError::NotCancellable(self.status));
        }

        let from = self.status;
        self.status = ApplicationStatus::Cancelled;
        self.status_changed_at = Some(now);
        self.updated_at = now;

        Ok(StatusTransition {
            from,
            to: ApplicationStatus::Cancelled,
            at: now,
        })
    }

    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary {
            id: self.id,
            status: self.status,
            status_changed_at: self.status_changed_at,
            submitted_at: self.submitted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            current_step: self.current_step,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("Invalid session ID format: {0}")]
    InvalidSessionId(String),

    #[error("Unknown application status: {0}")]
    UnknownStatus(String),

    #[error("Cannot move application from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Cannot cancel application with status: {0}")]
    NotCancellable(ApplicationStatus),
}
