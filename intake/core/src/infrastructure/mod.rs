// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Adapters for the domain ports: PostgreSQL, object stores, the task
//! queue, identifier hashing, token verification and the event bus.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** External system integration

pub mod db;
pub mod event_bus;
pub mod hashing;
pub mod jwt;
pub mod repositories;
pub mod storage;
pub mod task_queue;
