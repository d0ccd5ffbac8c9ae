// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Application Repository
//!
//! Persists the `Application` aggregate into the flat `applications` table.
//! The transformed form record is spread over one column per field; JSON
//! sections are stored as serialized text. A row carries a record once
//! `steps_completed` is set, which happens on the first successful submit.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `ApplicationRepository` over PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use crate::domain::application::{
    ApplicantScope, Application, ApplicationId, ApplicationStatus, DemoSessionId, OwnerId,
};
use crate::domain::form::{ApplicationRecord, FINAL_STEP};
use crate::domain::repository::{ApplicationRepository, RepositoryError};
use crate::domain::stored_file::FileId;

const SELECT_COLUMNS: &str = r#"
    id, applicant_id, demo_session_id, status, status_notes, status_changed_at,
    submitted_at, current_step, ssn_hash,
    birthdate::text AS birthdate, birthplace, permanent_resident_card_file_id,
    spouses, children, direct_deposit_type, direct_deposit_domestic,
    direct_deposit_international, emergency_contact,
    date_condition_began_affecting_work::text AS date_condition_began_affecting_work,
    employment_history, self_employment_history, earnings_history,
    served_in_us_military, military_service_records, education, special_education,
    job_training, disability_benefits, conditions, functional_limitations,
    healthcare_providers, medical_tests, medications, evidence_documents,
    other_record_sources, social_security_statement_file_id, birth_certificate_file_id,
    citizenship_proof_file_id, military_discharge_papers_file_id, w2_forms,
    self_employment_tax_returns, workers_comp_proof, steps_completed,
    created_at, updated_at
"#;

/// Scope predicate shared by every scoped query: `$N` is the owner and
/// `$N+1` the optional demo session (NULL for private applications).
fn scope_predicate(first: usize) -> String {
    format!(
        "applicant_id = ${} AND demo_session_id IS NOT DISTINCT FROM ${}",
        first,
        first + 1
    )
}

pub struct PostgresApplicationRepository {
    pool: PgPool,
}

impl PostgresApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a conditional update matched no row
    async fn stale_write(&self, id: ApplicationId) -> RepositoryError {
        let current: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM applications WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(Some(status)) => RepositoryError::Conflict(format!("Application {} is {}", id, status)),
            Ok(None) => RepositoryError::NotFound(format!("Application {}", id)),
            Err(e) => RepositoryError::Database(e.to_string()),
        }
    }
}

#[async_trait]
impl ApplicationRepository for PostgresApplicationRepository {
    async fn insert(&self, application: &Application) -> Result<(), RepositoryError> {
        let query = sqlx::query(
            r#"
            INSERT INTO applications (
                id, applicant_id, demo_session_id, status, status_notes, status_changed_at,
                submitted_at, current_step, ssn_hash,
                birthdate, birthplace, permanent_resident_card_file_id,
                spouses, children, direct_deposit_type, direct_deposit_domestic,
                direct_deposit_international, emergency_contact,
                date_condition_began_affecting_work,
                employment_history, self_employment_history, earnings_history,
                served_in_us_military, military_service_records, education, special_education,
                job_training, disability_benefits, conditions, functional_limitations,
                healthcare_providers, medical_tests, medications, evidence_documents,
                other_record_sources, social_security_statement_file_id, birth_certificate_file_id,
                citizenship_proof_file_id, military_discharge_papers_file_id, w2_forms,
                self_employment_tax_returns, workers_comp_proof, steps_completed,
                created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                $10::date, $11, $12, $13, $14, $15, $16, $17, $18,
                $19::date, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                $31, $32, $33, $34, $35, $36, $37, $38, $39, $40, $41, $42, $43,
                $44, $45
            )
            "#,
        );

        bind_application(query, application)
            .execute(&self.pool)
            .await
            .map_err(|e| match RepositoryError::from(e) {
                RepositoryError::Conflict(msg) => RepositoryError::Conflict(msg),
                other => RepositoryError::Database(format!("Failed to insert application: {}", other)),
            })?;

        Ok(())
    }

    async fn save(
        &self,
        application: &Application,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError> {
        let query = sqlx::query(
            r#"
            UPDATE applications SET
                applicant_id = $2, demo_session_id = $3, status = $4, status_notes = $5,
                status_changed_at = $6, submitted_at = $7, current_step = $8, ssn_hash = $9,
                birthdate = $10::date, birthplace = $11, permanent_resident_card_file_id = $12,
                spouses = $13, children = $14, direct_deposit_type = $15,
                direct_deposit_domestic = $16, direct_deposit_international = $17,
                emergency_contact = $18, date_condition_began_affecting_work = $19::date,
                employment_history = $20, self_employment_history = $21, earnings_history = $22,
                served_in_us_military = $23, military_service_records = $24, education = $25,
                special_education = $26, job_training = $27, disability_benefits = $28,
                conditions = $29, functional_limitations = $30, healthcare_providers = $31,
                medical_tests = $32, medications = $33, evidence_documents = $34,
                other_record_sources = $35, social_security_statement_file_id = $36,
                birth_certificate_file_id = $37, citizenship_proof_file_id = $38,
                military_discharge_papers_file_id = $39, w2_forms = $40,
                self_employment_tax_returns = $41, workers_comp_proof = $42,
                steps_completed = $43, created_at = $44, updated_at = $45
            WHERE id = $1 AND status = $46
            "#,
        );

        let result = bind_application(query, application)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to save application: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write(application.id).await);
        }

        Ok(())
    }

    async fn update_status(
        &self,
        application: &Application,
        expected: ApplicationStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE applications SET
                status = $2, status_notes = $3, status_changed_at = $4, updated_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(application.id.0)
        .bind(application.status.as_str())
        .bind(application.status_notes.clone())
        .bind(application.status_changed_at)
        .bind(application.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to update application status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(self.stale_write(application.id).await);
        }

        Ok(())
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let sql = format!("SELECT {} FROM applications WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(parse_application_row).transpose()
    }

    async fn find_in_scope(
        &self,
        id: ApplicationId,
        scope: &ApplicantScope,
    ) -> Result<Option<Application>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM applications WHERE id = $1 AND {}",
            SELECT_COLUMNS,
            scope_predicate(2)
        );
        let row = sqlx::query(&sql)
            .bind(id.0)
            .bind(scope.owner_id.0)
            .bind(scope.demo_session_id.map(|s| s.as_uuid()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(parse_application_row).transpose()
    }

    async fn find_active_in_scope(
        &self,
        scope: &ApplicantScope,
    ) -> Result<Option<Application>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM applications WHERE {} AND status = ANY($3) ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS,
            scope_predicate(1)
        );
        let active: Vec<String> = ApplicationStatus::ACTIVE
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let row = sqlx::query(&sql)
            .bind(scope.owner_id.0)
            .bind(scope.demo_session_id.map(|s| s.as_uuid()))
            .bind(active)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.map(parse_application_row).transpose()
    }

    async fn list_in_scope(&self, scope: &ApplicantScope) -> Result<Vec<Application>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM applications WHERE {} ORDER BY created_at DESC",
            SELECT_COLUMNS,
            scope_predicate(1)
        );
        let rows = sqlx::query(&sql)
            .bind(scope.owner_id.0)
            .bind(scope.demo_session_id.map(|s| s.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.into_iter().map(parse_application_row).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Database ping failed: {}", e)))?;
        Ok(())
    }
}

fn bind_application<'q>(
    query: Query<'q, Postgres, PgArguments>,
    application: &Application,
) -> Query<'q, Postgres, PgArguments> {
    let record = application.record.as_ref();

    query
        .bind(application.id.0)
        .bind(application.applicant_id.0)
        .bind(application.demo_session_id.map(|s| s.as_uuid()))
        .bind(application.status.as_str())
        .bind(application.status_notes.clone())
        .bind(application.status_changed_at)
        .bind(application.submitted_at)
        .bind(application.current_step)
        .bind(application.ssn_hash.clone())
        .bind(record.and_then(|r| r.birthdate.clone()))
        .bind(record.and_then(|r| r.birthplace.clone()))
        .bind(record.and_then(|r| r.permanent_resident_card_file_id).map(|id| id.0))
        .bind(record.map(|r| r.spouses.clone()))
        .bind(record.map(|r| r.children.clone()))
        .bind(record.map(|r| r.direct_deposit_type.clone()))
        .bind(record.and_then(|r| r.direct_deposit_domestic.clone()))
        .bind(record.and_then(|r| r.direct_deposit_international.clone()))
        .bind(record.map(|r| r.emergency_contact.clone()))
        .bind(record.and_then(|r| r.date_condition_began_affecting_work.clone()))
        .bind(record.map(|r| r.employment_history.clone()))
        .bind(record.map(|r| r.self_employment_history.clone()))
        .bind(record.map(|r| r.earnings_history.clone()))
        .bind(record.map(|r| r.served_in_us_military))
        .bind(record.map(|r| r.military_service_records.clone()))
        .bind(record.map(|r| r.education.clone()))
        .bind(record.map(|r| r.special_education.clone()))
        .bind(record.map(|r| r.job_training.clone()))
        .bind(record.map(|r| r.disability_benefits.clone()))
        .bind(record.map(|r| r.conditions.clone()))
        .bind(record.map(|r| r.functional_limitations.clone()))
        .bind(record.map(|r| r.healthcare_providers.clone()))
        .bind(record.map(|r| r.medical_tests.clone()))
        .bind(record.map(|r| r.medications.clone()))
        .bind(record.map(|r| r.evidence_documents.clone()))
        .bind(record.map(|r| r.other_record_sources.clone()))
        .bind(record.and_then(|r| r.social_security_statement_file_id).map(|id| id.0))
        .bind(record.and_then(|r| r.birth_certificate_file_id).map(|id| id.0))
        .bind(record.and_then(|r| r.citizenship_proof_file_id).map(|id| id.0))
        .bind(record.and_then(|r| r.military_discharge_papers_file_id).map(|id| id.0))
        .bind(record.map(|r| r.w2_forms.clone()))
        .bind(record.map(|r| r.self_employment_tax_returns.clone()))
        .bind(record.map(|r| r.workers_comp_proof.clone()))
        .bind(record.map(|r| r.steps_completed.clone()))
        .bind(application.created_at)
        .bind(application.updated_at)
}

fn parse_application_row(row: PgRow) -> Result<Application, RepositoryError> {
    let id: Uuid = row.try_get("id")?;
    let applicant_id: Uuid = row.try_get("applicant_id")?;
    let demo_session_id: Option<Uuid> = row.try_get("demo_session_id")?;
    let status: String = row.try_get("status")?;
    let current_step: Option<i32> = row.try_get("current_step")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let status: ApplicationStatus = status
        .parse()
        .map_err(|e| RepositoryError::Serialization(format!("Failed to parse status: {}", e)))?;

    let owner = OwnerId(applicant_id);
    let steps_completed: Option<String> = row.try_get("steps_completed")?;
    let record = match steps_completed {
        Some(steps_completed) => Some(parse_record(&row, owner, current_step, steps_completed)?),
        None => None,
    };

    Ok(Application {
        id: ApplicationId(id),
        applicant_id: owner,
        demo_session_id: demo_session_id.map(DemoSessionId::from_stored),
        status,
        status_notes: row.try_get("status_notes")?,
        status_changed_at: row.try_get("status_changed_at")?,
        submitted_at: row.try_get("submitted_at")?,
        created_at,
        updated_at,
        current_step,
        ssn_hash: row.try_get("ssn_hash")?,
        record,
    })
}

fn parse_record(
    row: &PgRow,
    owner: OwnerId,
    current_step: Option<i32>,
    steps_completed: String,
) -> Result<ApplicationRecord, RepositoryError> {
    let text = |column: &str| -> Result<String, RepositoryError> {
        let value: Option<String> = row.try_get(column)?;
        Ok(value.unwrap_or_default())
    };
    let file = |column: &str| -> Result<Option<FileId>, RepositoryError> {
        let value: Option<Uuid> = row.try_get(column)?;
        Ok(value.map(FileId))
    };

    Ok(ApplicationRecord {
        applicant_id: owner,
        birthdate: row.try_get("birthdate")?,
        birthplace: row.try_get("birthplace")?,
        permanent_resident_card_file_id: file("permanent_resident_card_file_id")?,
        spouses: text("spouses")?,
        children: text("children")?,
        direct_deposit_type: text("direct_deposit_type")?,
        direct_deposit_domestic: row.try_get("direct_deposit_domestic")?,
        direct_deposit_international: row.try_get("direct_deposit_international")?,
        emergency_contact: text("emergency_contact")?,
        date_condition_began_affecting_work: row.try_get("date_condition_began_affecting_work")?,
        employment_history: text("employment_history")?,
        self_employment_history: text("self_employment_history")?,
        earnings_history: text("earnings_history")?,
        served_in_us_military: row
            .try_get::<Option<bool>, _>("served_in_us_military")?
            .unwrap_or(false),
        military_service_records: text("military_service_records")?,
        education: text("education")?,
        special_education: text("special_education")?,
        job_training: text("job_training")?,
        disability_benefits: text("disability_benefits")?,
        conditions: text("conditions")?,
        functional_limitations: text("functional_limitations")?,
        healthcare_providers: text("healthcare_providers")?,
        medical_tests: text("medical_tests")?,
        medications: text("medications")?,
        evidence_documents: text("evidence_documents")?,
        other_record_sources: text("other_record_sources")?,
        social_security_statement_file_id: file("social_security_statement_file_id")?,
        birth_certificate_file_id: file("birth_certificate_file_id")?,
        citizenship_proof_file_id: file("citizenship_proof_file_id")?,
        military_discharge_papers_file_id: file("military_discharge_papers_file_id")?,
        w2_forms: text("w2_forms")?,
        self_employment_tax_returns: text("self_employment_tax_returns")?,
        workers_comp_proof: text("workers_comp_proof")?,
        current_step: current_step.unwrap_or(FINAL_STEP),
        steps_completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_predicate_matches_null_sessions() {
        assert_eq!(
            scope_predicate(2),
            "applicant_id = $2 AND demo_session_id IS NOT DISTINCT FROM $3"
        );
    }
}
