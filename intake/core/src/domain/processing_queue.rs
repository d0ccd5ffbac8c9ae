// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Processing Queue
//!
//! Durable fallback row written next to every task dispatch, so a lost or
//! failed enqueue can be reconciled later by a sweeper.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Fallback work item for downstream evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::application::ApplicationId;
use crate::domain::task::{EvaluationTask, AI_TASK_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemStatus::Pending => "pending",
            QueueItemStatus::Processing => "processing",
            QueueItemStatus::Completed => "completed",
            QueueItemStatus::Failed => "failed",
            QueueItemStatus::Cancelled => "cancelled",
        }
    }

    /// Items a cancellation still reaches
    pub fn is_open(&self) -> bool {
        matches!(self, QueueItemStatus::Pending | QueueItemStatus::Processing)
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueItemStatus::Pending),
            "processing" => Ok(QueueItemStatus::Processing),
            "completed" => Ok(QueueItemStatus::Completed),
            "failed" => Ok(QueueItemStatus::Failed),
            "cancelled" => Ok(QueueItemStatus::Cancelled),
            other => Err(format!("Unknown processing queue status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingQueueItem {
    pub id: Uuid,
    pub application_id: ApplicationId,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub status: QueueItemStatus,
    pub created_at: DateTime<Utc>,
}

impl ProcessingQueueItem {
    pub fn pending(application_id: ApplicationId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            task_type: AI_TASK_TYPE.to_string(),
            payload: EvaluationTask::for_application(application_id).payload_value(),
            status: QueueItemStatus::Pending,
            created_at: now,
        }
    }
}
