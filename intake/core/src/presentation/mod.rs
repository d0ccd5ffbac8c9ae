// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface that translates requests into application service calls.
//! No business logic lives here.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Router, handlers and health endpoints |
//! | [`error`] | `ApiError` and its JSON rendering |
//! | [`extract`] | Authenticated and demo applicant extractors |
//! | [`multipart`] | Submission body decoding |
//! | [`rate_limit`] | Keyed request limiters |

pub mod api;
pub mod error;
pub mod extract;
pub mod multipart;
pub mod rate_limit;

pub use api::{app, AppState, HealthProbes};
pub use error::ApiError;
