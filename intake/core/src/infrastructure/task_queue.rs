// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task Queue Adapters
//!
//! `TaskQueue` implementations: Amazon SQS in production and an in-memory
//! queue for development and tests.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Deliver evaluation task messages to downstream workers

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::task::{DispatchError, MessageId, TaskQueue};

/// Amazon SQS queue client
pub struct SqsTaskQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsTaskQueue {
    /// Build a client from the default AWS credential chain for `region`
    pub async fn connect(queue_url: impl Into<String>, region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new(region.into()))
            .load()
            .await;

        Self {
            client: aws_sdk_sqs::Client::new(&config),
            queue_url: queue_url.into(),
        }
    }

    pub fn with_client(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl TaskQueue for SqsTaskQueue {
    async fn send(&self, body: String) -> Result<MessageId, DispatchError> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|err| DispatchError::Transport {
                code: err.code().map(str::to_string),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        Ok(MessageId(output.message_id().unwrap_or_default().to_string()))
    }

    fn endpoint(&self) -> String {
        self.queue_url.clone()
    }
}

/// Queue that keeps sent bodies in memory
#[derive(Clone, Default)]
pub struct InMemoryTaskQueue {
    messages: Arc<Mutex<Vec<(MessageId, String)>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<(MessageId, String)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn send(&self, body: String) -> Result<MessageId, DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport {
                message: "queue unavailable".to_string(),
                code: Some("AWS.SimpleQueueService.NonExistentQueue".to_string()),
            });
        }
        let id = MessageId(Uuid::new_v4().to_string());
        self.messages.lock().push((id.clone(), body));
        Ok(id)
    }

    fn endpoint(&self) -> String {
        "memory://tasks".to_string()
    }
}
