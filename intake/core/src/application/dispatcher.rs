// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task Dispatcher
//!
//! Best-effort enqueue of the downstream evaluation task. `enqueue` never
//! fails its caller: an unconfigured queue is a normal operating mode
//! (local development) and transport errors are logged and swallowed. The
//! durable fallback row written by the orchestrator covers lost messages.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::application::ApplicationId;
use crate::domain::task::{EvaluationTask, MessageId, TaskQueue};

#[derive(Clone, Default)]
pub struct TaskDispatcher {
    queue: Option<Arc<dyn TaskQueue>>,
}

impl TaskDispatcher {
    pub fn new(queue: Option<Arc<dyn TaskQueue>>) -> Self {
        Self { queue }
    }

    /// Dispatcher with no queue configured; every enqueue is skipped
    pub fn disabled() -> Self {
        Self { queue: None }
    }

    pub fn is_configured(&self) -> bool {
        self.queue.is_some()
    }

    pub async fn enqueue(&self, application_id: ApplicationId) -> Option<MessageId> {
        let Some(queue) = &self.queue else {
            warn!(
                application_id = %application_id,
                "Task queue not configured, skipping evaluation task"
            );
            metrics::counter!("intake_task_dispatch_total", "outcome" => "skipped").increment(1);
            return None;
        };

        let body = match EvaluationTask::for_application(application_id).to_body() {
            Ok(body) => body,
            Err(e) => {
                error!(application_id = %application_id, error = %e, "Failed to encode evaluation task");
                metrics::counter!("intake_task_dispatch_total", "outcome" => "failed").increment(1);
                return None;
            }
        };

        match queue.send(body).await {
            Ok(message_id) => {
                info!(
                    application_id = %application_id,
                    message_id = %message_id.0,
                    queue = %queue.endpoint(),
                    "Evaluation task enqueued"
                );
                metrics::counter!("intake_task_dispatch_total", "outcome" => "sent").increment(1);
                Some(message_id)
            }
            Err(e) => {
                error!(
                    application_id = %application_id,
                    queue = %queue.endpoint(),
                    code = e.code().unwrap_or("unknown"),
                    error = %e,
                    "Failed to enqueue evaluation task"
                );
                metrics::counter!("intake_task_dispatch_total", "outcome" => "failed").increment(1);
                None
            }
        }
    }
}
