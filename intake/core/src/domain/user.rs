// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! User Accounts
//!
//! Row of the `users` table linking an identity-provider subject (`auth_id`)
//! to the database user id that owns applications.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Principal resolution value type

use serde::{Deserialize, Serialize};

use crate::domain::application::OwnerId;

pub const APPLICANT_ROLE: &str = "applicant";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: OwnerId,
    pub auth_id: String,
    pub role: String,
}
