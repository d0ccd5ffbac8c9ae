// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Submission Events
//
// In-memory event streaming over a tokio broadcast channel. The background
// phase of a submission has no caller left to answer, so its progress and
// outcome are published here for logs, tests and observers.
//
// Events are not persisted; a restart loses them.

use crate::domain::application::ApplicationId;
use crate::domain::events::SubmissionEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to submission events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<SubmissionEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity determines how many events can be buffered before dropping old ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SubmissionEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all submission events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single application
    pub fn subscribe_application(&self, application_id: ApplicationId) -> ApplicationEventReceiver {
        ApplicationEventReceiver {
            receiver: self.sender.subscribe(),
            application_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(err: broadcast::error::RecvError) -> EventBusError {
    match err {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all submission events
pub struct EventReceiver {
    receiver: broadcast::Receiver<SubmissionEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<SubmissionEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<SubmissionEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for the events of one application (filtered)
pub struct ApplicationEventReceiver {
    receiver: broadcast::Receiver<SubmissionEvent>,
    application_id: ApplicationId,
}

impl ApplicationEventReceiver {
    /// Receive the next event of the watched application, skipping others
    pub async fn recv(&mut self) -> Result<SubmissionEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.application_id() == self.application_id {
                return Ok(event);
            }
        }
    }

    /// Wait for the event that ends the current processing run
    pub async fn recv_terminal(&mut self) -> Result<SubmissionEvent, EventBusError> {
        loop {
            let event = self.recv().await?;
            if event.is_terminal() {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn failed(application_id: ApplicationId) -> SubmissionEvent {
        SubmissionEvent::SubmissionFailed {
            application_id,
            step: "store_files".to_string(),
            reason: "storage offline".to_string(),
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let application_id = ApplicationId::new();

        event_bus.publish(failed(application_id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.application_id(), application_id);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_application_filter_skips_other_applications() {
        let event_bus = EventBus::new(10);
        let watched = ApplicationId::new();
        let mut receiver = event_bus.subscribe_application(watched);

        event_bus.publish(failed(ApplicationId::new()));
        event_bus.publish(SubmissionEvent::FileStored {
            application_id: watched,
            file_id: crate::domain::stored_file::FileId::new(),
            storage_path: "a/b/c.pdf".to_string(),
            stored_at: Utc::now(),
        });
        event_bus.publish(failed(watched));

        let terminal = receiver.recv_terminal().await.unwrap();
        assert!(matches!(terminal, SubmissionEvent::SubmissionFailed { application_id, .. } if application_id == watched));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let event_bus = EventBus::default();
        assert_eq!(event_bus.subscriber_count(), 0);
        event_bus.publish(failed(ApplicationId::new()));
    }
}
