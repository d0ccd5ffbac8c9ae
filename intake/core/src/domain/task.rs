// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Downstream Evaluation Task
//!
//! Envelope sent to the AI evaluation queue after a successful submission and
//! the port through which it is sent. The envelope duplicates the application
//! id into a nested payload for the consumer's convenience:
//!
//! ```json
//! {"task_type": "ai", "application_id": "…", "payload": {"application_id": "…"}}
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Task envelope and queue port (implemented in `crate::infrastructure::task_queue`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::application::ApplicationId;

pub const AI_TASK_TYPE: &str = "ai";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub application_id: ApplicationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationTask {
    pub task_type: String,
    pub application_id: ApplicationId,
    pub payload: TaskPayload,
}

impl EvaluationTask {
    pub fn for_application(application_id: ApplicationId) -> Self {
        Self {
            task_type: AI_TASK_TYPE.to_string(),
            application_id,
            payload: TaskPayload { application_id },
        }
    }

    pub fn to_body(&self) -> Result<String, DispatchError> {
        serde_json::to_string(self).map_err(|e| DispatchError::Serialization(e.to_string()))
    }

    /// Nested payload as a JSON value, as stored on the fallback queue row
    pub fn payload_value(&self) -> serde_json::Value {
        serde_json::json!({ "application_id": self.payload.application_id })
    }
}

/// Identifier assigned by the queue to an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Message queue consumed by the evaluation workers
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Send one message body, returning the id the queue assigned to it
    async fn send(&self, body: String) -> Result<MessageId, DispatchError>;

    /// Human-readable queue location for logs
    fn endpoint(&self) -> String;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Queue transport error: {message}")]
    Transport { message: String, code: Option<String> },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DispatchError {
    pub fn code(&self) -> Option<&str> {
        match self {
            DispatchError::Transport { code, .. } => code.as_deref(),
            DispatchError::Serialization(_) => None,
        }
    }
}
