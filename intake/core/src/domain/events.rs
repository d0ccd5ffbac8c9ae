// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::application::{ApplicationId, DemoSessionId, OwnerId};
use crate::domain::stored_file::FileId;

/// Submission lifecycle events published on the event bus
///
/// The async processing phase has no caller to report to; these events are
/// how tests, logs and future observers see its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmissionEvent {
    SubmissionReceived {
        application_id: ApplicationId,
        owner_id: OwnerId,
        demo_session_id: Option<DemoSessionId>,
        file_count: usize,
        received_at: DateTime<Utc>,
    },
    FileStored {
        application_id: ApplicationId,
        file_id: FileId,
        storage_path: String,
        stored_at: DateTime<Utc>,
    },
    /// A blob could not be removed after its metadata write failed
    FileOrphaned {
        application_id: ApplicationId,
        storage_path: String,
        reason: String,
        detected_at: DateTime<Utc>,
    },
    SubmissionCompleted {
        application_id: ApplicationId,
        message_id: Option<String>,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    SubmissionFailed {
        application_id: ApplicationId,
        step: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    ApplicationCancelled {
        application_id: ApplicationId,
        cancelled_by: OwnerId,
        cancelled_at: DateTime<Utc>,
    },
}

impl SubmissionEvent {
    pub fn application_id(&self) -> ApplicationId {
        match self {
            SubmissionEvent::SubmissionReceived { application_id, .. }
            | SubmissionEvent::FileStored { application_id, .. }
            | SubmissionEvent::FileOrphaned { application_id, .. }
            | SubmissionEvent::SubmissionCompleted { application_id, .. }
            | SubmissionEvent::SubmissionFailed { application_id, .. }
            | SubmissionEvent::ApplicationCancelled { application_id, .. } => *application_id,
        }
    }

    /// Whether the event ends a processing run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionEvent::SubmissionCompleted { .. } | SubmissionEvent::SubmissionFailed { .. }
        )
    }
}
