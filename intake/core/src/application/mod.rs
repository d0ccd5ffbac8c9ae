// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod applications;
pub mod dispatcher;
pub mod storage_gateway;
pub mod submission;
pub mod submission_worker;

// Re-export use cases for convenience
pub use applications::{ApplicationService, ApplicationServiceError, StandardApplicationService};
pub use dispatcher::TaskDispatcher;
pub use storage_gateway::{DiscardOutcome, GatewayError, StorageGateway};
pub use submission::{
    AcceptedSubmission, SagaStep, SubmissionError, SubmissionJob, SubmissionOrchestrator,
    SubmissionOutcome, SubmissionRequest,
};
pub use submission_worker::{SubmissionQueue, SubmissionWorker};
