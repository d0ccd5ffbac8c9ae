// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Submission Worker Application Service
//!
//! Runs the background phase of submissions outside the request. The HTTP
//! handler hands a [`SubmissionJob`] to the [`SubmissionQueue`] after the
//! draft is created; the worker consumes jobs from a bounded `mpsc` channel
//! and runs [`SubmissionOrchestrator::process`] for each one on its own task.
//! At most `max_concurrent` jobs run at once; further jobs wait in the
//! channel, and once the channel is full new jobs are refused.
//!
//! A job that cannot be queued (channel full or closed) has its draft
//! reverted straight away. A job whose task panics is reverted by the
//! worker. When every queue handle is dropped the worker drains the jobs
//! still in flight, then stops.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::application::submission::{SubmissionJob, SubmissionOrchestrator, SubmissionOutcome};
use crate::domain::application::ApplicationId;

const QUEUE_UNAVAILABLE: &str = "Submission queue is unavailable";
const UNEXPECTED_FAILURE: &str = "Unexpected error while processing submission";

/// Sending half handed to request handlers
#[derive(Clone)]
pub struct SubmissionQueue {
    sender: mpsc::Sender<SubmissionJob>,
    orchestrator: Arc<SubmissionOrchestrator>,
}

impl SubmissionQueue {
    /// Queue a job without waiting; on failure its draft is reverted.
    ///
    /// Returns whether the job was queued.
    pub fn dispatch(&self, job: SubmissionJob) -> bool {
        let application_id = job.application_id;
        match self.sender.try_send(job) {
            Ok(()) => {
                debug!(application_id = %application_id, "Submission job queued");
                true
            }
            Err(e) => {
                error!(application_id = %application_id, error = %e, "Failed to queue submission job");
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator.abandon(application_id, QUEUE_UNAVAILABLE).await;
                });
                false
            }
        }
    }
}

pub struct SubmissionWorker {
    orchestrator: Arc<SubmissionOrchestrator>,
    receiver: Mutex<Option<mpsc::Receiver<SubmissionJob>>>,
    max_concurrent: usize,
}

impl SubmissionWorker {
    /// Create the worker and the queue feeding it.
    ///
    /// `capacity` bounds the jobs waiting in the channel, `max_concurrent`
    /// the jobs being processed.
    pub fn new(
        orchestrator: Arc<SubmissionOrchestrator>,
        capacity: usize,
        max_concurrent: usize,
    ) -> (Self, SubmissionQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = SubmissionQueue {
            sender,
            orchestrator: orchestrator.clone(),
        };
        let worker = Self {
            orchestrator,
            receiver: Mutex::new(Some(receiver)),
            max_concurrent: max_concurrent.max(1),
        };
        (worker, queue)
    }

    /// Start the background processing task.
    ///
    /// The task runs until every `SubmissionQueue` clone has been dropped and
    /// the jobs in flight have finished.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(max_concurrent = self.max_concurrent, "Starting submission worker background task");

        tokio::spawn(async move {
            let Some(mut receiver) = self.receiver.lock().take() else {
                warn!("Submission worker already started");
                return;
            };

            let mut in_flight = JoinSet::new();
            let mut applications: HashMap<tokio::task::Id, ApplicationId> = HashMap::new();
            let mut submitted = 0u64;
            let mut failed = 0u64;

            loop {
                tokio::select! {
                    job = receiver.recv(), if in_flight.len() < self.max_concurrent => match job {
                        Some(job) => {
                            let application_id = job.application_id;
                            let orchestrator = self.orchestrator.clone();
                            let handle = in_flight.spawn(async move { orchestrator.process(job).await });
                            applications.insert(handle.id(), application_id);
                        }
                        None => break,
                    },
                    Some(result) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                        if self.settle(result, &mut applications).await {
                            submitted += 1;
                        } else {
                            failed += 1;
                        }
                    }
                }
            }

            info!(
                "Submission queue closed, draining {} in-flight jobs",
                in_flight.len()
            );
            while let Some(result) = in_flight.join_next_with_id().await {
                if self.settle(result, &mut applications).await {
                    submitted += 1;
                } else {
                    failed += 1;
                }
            }

            info!(
                "Submission worker shut down gracefully ({} submitted, {} failed)",
                submitted, failed
            );
        })
    }

    /// Account for one finished job; returns whether it was submitted
    async fn settle(
        &self,
        result: Result<(tokio::task::Id, SubmissionOutcome), JoinError>,
        applications: &mut HashMap<tokio::task::Id, ApplicationId>,
    ) -> bool {
        match result {
            Ok((id, outcome)) => {
                applications.remove(&id);
                matches!(outcome, SubmissionOutcome::Submitted { .. })
            }
            Err(e) => {
                let application_id = applications.remove(&e.id());
                error!(
                    application_id = ?application_id.map(|id| id.to_string()),
                    error = %e,
                    "Submission task terminated unexpectedly"
                );
                if let Some(application_id) = application_id {
                    self.orchestrator.abandon(application_id, UNEXPECTED_FAILURE).await;
                }
                false
            }
        }
    }
}
