// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Status History Repository
//!
//! Append-only audit trail of application status transitions.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::application::{ApplicationId, ApplicationStatus, OwnerId};
use crate::domain::repository::{RepositoryError, StatusHistoryRepository};
use crate::domain::status_history::StatusHistoryEntry;

pub struct PostgresStatusHistoryRepository {
    pool: PgPool,
}

impl PostgresStatusHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusHistoryRepository for PostgresStatusHistoryRepository {
    async fn append(&self, entry: &StatusHistoryEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO application_status_history (
                id, application_id, previous_status, new_status, changed_by, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.application_id.0)
        .bind(entry.previous_status.as_str())
        .bind(entry.new_status.as_str())
        .bind(entry.changed_by.0)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append status history: {}", e)))?;

        Ok(())
    }

    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, application_id, previous_status, new_status, changed_by, notes, created_at
            FROM application_status_history
            WHERE application_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(application_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(parse_history_row).collect()
    }
}

fn parse_status(value: String) -> Result<ApplicationStatus, RepositoryError> {
    value
        .parse()
        .map_err(|e| RepositoryError::Serialization(format!("Failed to parse status: {}", e)))
}

fn parse_history_row(row: PgRow) -> Result<StatusHistoryEntry, RepositoryError> {
    let application_id: Uuid = row.try_get("application_id")?;
    let changed_by: Uuid = row.try_get("changed_by")?;

    Ok(StatusHistoryEntry {
        id: row.try_get("id")?,
        application_id: ApplicationId(application_id),
        previous_status: parse_status(row.try_get("previous_status")?)?,
        new_status: parse_status(row.try_get("new_status")?)?,
        changed_by: OwnerId(changed_by),
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}
