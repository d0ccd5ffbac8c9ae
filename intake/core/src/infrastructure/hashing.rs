// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identifier Hashers
//!
//! Two `IdentifierHasher` backends:
//!
//! - `PostgresIdentifierHasher` calls the `hash_ssn(text)` database function,
//!   so the salt never leaves the database
//! - `HmacIdentifierHasher` computes a keyed HMAC-SHA256 in process
//!
//! Both strip every non-digit first, so `123-45-6789` and `123456789` hash
//! to the same value.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::postgres::PgPool;

use crate::domain::hashing::{HashingError, IdentifierHasher};

type HmacSha256 = Hmac<Sha256>;

pub fn normalize_identifier(identifier: &str) -> String {
    identifier.chars().filter(char::is_ascii_digit).collect()
}

pub struct HmacIdentifierHasher {
    key: Vec<u8>,
}

impl HmacIdentifierHasher {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, HashingError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(HashingError::InvalidKey("key must not be empty".to_string()));
        }
        Ok(Self { key: key.to_vec() })
    }
}

#[async_trait]
impl IdentifierHasher for HmacIdentifierHasher {
    async fn hash(&self, identifier: &str) -> Result<String, HashingError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| HashingError::InvalidKey(e.to_string()))?;
        mac.update(normalize_identifier(identifier).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

pub struct PostgresIdentifierHasher {
    pool: PgPool,
}

impl PostgresIdentifierHasher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentifierHasher for PostgresIdentifierHasher {
    async fn hash(&self, identifier: &str) -> Result<String, HashingError> {
        let hash: Option<String> = sqlx::query_scalar("SELECT hash_ssn($1)")
            .bind(identifier)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| HashingError::Backend(e.to_string()))?;

        hash.ok_or_else(|| HashingError::Backend("hash_ssn returned NULL".to_string()))
    }
}
