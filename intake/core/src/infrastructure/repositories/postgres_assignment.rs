// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Assignment and User Lookups
//!
//! Read-only views over tables owned by the reviewer side
//! (`assigned_applications`) and the identity bridge (`users`).

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::application::{ApplicationId, OwnerId};
use crate::domain::assignment::Assignment;
use crate::domain::repository::{AssignmentRepository, RepositoryError, UserDirectory};
use crate::domain::user::UserAccount;

pub struct PostgresAssignmentRepository {
    pool: PgPool,
}

impl PostgresAssignmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Assignment>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT application_id, reviewer_id, review_status, recommendation,
                   assigned_at, last_accessed_at
            FROM assigned_applications
            WHERE application_id = $1
            "#,
        )
        .bind(application_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let reviewer_id: Option<Uuid> = row.try_get("reviewer_id")?;
        Ok(Some(Assignment {
            application_id,
            reviewer_id: reviewer_id.map(OwnerId),
            review_status: row.try_get("review_status")?,
            recommendation: row.try_get("recommendation")?,
            assigned_at: row.try_get("assigned_at")?,
            last_accessed_at: row.try_get("last_accessed_at")?,
        }))
    }
}

pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query("SELECT id, auth_id, role FROM users WHERE auth_id = $1")
            .bind(auth_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.try_get("id")?;
        Ok(Some(UserAccount {
            id: OwnerId(id),
            auth_id: row.try_get("auth_id")?,
            role: row.try_get("role")?,
        }))
    }
}
