// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Benefits Intake Core
//!
//! Domain model, submission pipeline and HTTP surface of the applicant intake
//! service. An applicant posts one multipart request; a draft application is
//! created synchronously and the files, form transformation, final persistence
//! and downstream task dispatch run on a background worker.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Exposes the domain, application, infrastructure and presentation layers

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
