// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Processing Queue Repository
//!
//! Fallback work items next to the task-queue dispatch. Cancellation flips
//! every open item of an application in one statement.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::application::ApplicationId;
use crate::domain::processing_queue::{ProcessingQueueItem, QueueItemStatus};
use crate::domain::repository::{ProcessingQueueRepository, RepositoryError};

pub struct PostgresProcessingQueueRepository {
    pool: PgPool,
}

impl PostgresProcessingQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessingQueueRepository for PostgresProcessingQueueRepository {
    async fn enqueue(&self, item: &ProcessingQueueItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO processing_queue (id, application_id, task_type, payload, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(item.id)
        .bind(item.application_id.0)
        .bind(&item.task_type)
        .bind(Json(&item.payload))
        .bind(item.status.as_str())
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to enqueue processing item: {}", e)))?;

        Ok(())
    }

    async fn cancel_open(&self, application_id: ApplicationId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE processing_queue
            SET status = 'cancelled', updated_at = $2
            WHERE application_id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(application_id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to cancel processing items: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<ProcessingQueueItem>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, application_id, task_type, payload, status, created_at
            FROM processing_queue
            WHERE application_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(application_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(parse_queue_row).collect()
    }
}

fn parse_queue_row(row: PgRow) -> Result<ProcessingQueueItem, RepositoryError> {
    let application_id: Uuid = row.try_get("application_id")?;
    let payload: Json<serde_json::Value> = row.try_get("payload")?;
    let status: String = row.try_get("status")?;

    let status: QueueItemStatus = status.parse().map_err(RepositoryError::Serialization)?;

    Ok(ProcessingQueueItem {
        id: row.try_get("id")?,
        application_id: ApplicationId(application_id),
        task_type: row.try_get("task_type")?,
        payload: payload.0,
        status,
        created_at: row.try_get("created_at")?,
    })
}
