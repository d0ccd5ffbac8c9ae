// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Aggregates, value objects and the ports the pipeline depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure business rules; no I/O happens in this module tree

pub mod application;
pub mod assignment;
pub mod config;
pub mod events;
pub mod form;
pub mod hashing;
pub mod intake;
pub mod processing_queue;
pub mod repository;
pub mod status_history;
pub mod storage;
pub mod stored_file;
pub mod task;
pub mod user;
