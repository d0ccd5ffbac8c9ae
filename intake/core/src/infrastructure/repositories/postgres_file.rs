// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Stored File Repository
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `StoredFileRepository` over the `application_files` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::application::{ApplicationId, OwnerId};
use crate::domain::repository::{RepositoryError, StoredFileRepository};
use crate::domain::stored_file::{FileCategory, FileId, StoredFile};

pub struct PostgresStoredFileRepository {
    pool: PgPool,
}

impl PostgresStoredFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoredFileRepository for PostgresStoredFileRepository {
    async fn insert(&self, file: &StoredFile) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO application_files (
                id, application_id, uploaded_by, file_name, file_type, file_size,
                storage_bucket, storage_path, file_category, description,
                document_year, is_deleted, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(file.id.0)
        .bind(file.application_id.0)
        .bind(file.uploaded_by.0)
        .bind(&file.file_name)
        .bind(&file.file_type)
        .bind(file.file_size)
        .bind(&file.storage_bucket)
        .bind(&file.storage_path)
        .bind(file.category.as_str())
        .bind(&file.description)
        .bind(file.document_year)
        .bind(file.is_deleted)
        .bind(file.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert file metadata: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: FileId) -> Result<Option<StoredFile>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, application_id, uploaded_by, file_name, file_type, file_size,
                   storage_bucket, storage_path, file_category, description,
                   document_year, is_deleted, created_at
            FROM application_files
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(parse_file_row).transpose()
    }

    async fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StoredFile>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, application_id, uploaded_by, file_name, file_type, file_size,
                   storage_bucket, storage_path, file_category, description,
                   document_year, is_deleted, created_at
            FROM application_files
            WHERE application_id = $1 AND is_deleted = FALSE
            ORDER BY created_at ASC
            "#,
        )
        .bind(application_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(parse_file_row).collect()
    }

    async fn delete(&self, id: FileId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM application_files WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to delete file metadata: {}", e)))?;
        Ok(())
    }
}

fn parse_file_row(row: PgRow) -> Result<StoredFile, RepositoryError> {
    let id: Uuid = row.try_get("id")?;
    let application_id: Uuid = row.try_get("application_id")?;
    let uploaded_by: Uuid = row.try_get("uploaded_by")?;
    let category: String = row.try_get("file_category")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    let category = FileCategory::parse(&category).ok_or_else(|| {
        RepositoryError::Serialization(format!("Unknown file category: {}", category))
    })?;

    Ok(StoredFile {
        id: FileId(id),
        application_id: ApplicationId(application_id),
        uploaded_by: OwnerId(uploaded_by),
        file_name: row.try_get("file_name")?,
        file_type: row.try_get("file_type")?,
        file_size: row.try_get("file_size")?,
        storage_bucket: row.try_get("storage_bucket")?,
        storage_path: row.try_get("storage_path")?,
        category,
        description: row.try_get("description")?,
        document_year: row.try_get("document_year")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at,
    })
}
