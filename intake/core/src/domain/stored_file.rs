// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Stored Files
//!
//! Metadata for one uploaded artifact and the fixed set of multipart upload
//! fields the intake endpoint accepts.
//!
//! A `StoredFile` row exists if and only if its blob exists in the object
//! store: blobs are written first, the row second, and the blob is removed
//! again when the row cannot be written (see
//! `crate::application::storage_gateway`).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Upload field catalogue, file categories and storage path derivation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::application::{ApplicationId, OwnerId};

/// Object-store bucket holding every application upload
pub const APPLICATION_FILES_BUCKET: &str = "application-files";

/// Extension used when the original filename does not carry one
const FALLBACK_EXTENSION: &str = "pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic grouping of an upload; also a storage path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Identification,
    SocialSecurity,
    BirthCertificate,
    Citizenship,
    Military,
    MedicalEvidence,
    W2Forms,
    SelfEmploymentTaxReturns,
    WorkersCompProof,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Identification => "identification",
            FileCategory::SocialSecurity => "social_security",
            FileCategory::BirthCertificate => "birth_certificate",
            FileCategory::Citizenship => "citizenship",
            FileCategory::Military => "military",
            FileCategory::MedicalEvidence => "medical_evidence",
            FileCategory::W2Forms => "w2_forms",
            FileCategory::SelfEmploymentTaxReturns => "self_employment_tax_returns",
            FileCategory::WorkersCompProof => "workers_comp_proof",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        UploadField::ALL
            .iter()
            .map(|field| field.category())
            .find(|category| category.as_str() == value)
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multipart file fields accepted by the submission endpoint.
///
/// Single fields hold at most one document and map onto a `*_file_id`
/// column; array fields map onto a JSON section of the application record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadField {
    PermanentResidentCard,
    SocialSecurityStatement,
    BirthCertificate,
    CitizenshipProof,
    MilitaryDischargePapers,
    EvidenceDocuments,
    W2Forms,
    SelfEmploymentTaxReturns,
    WorkersCompProof,
}

impl UploadField {
    /// Processing order: single-file fields first, then arrays
    pub const ALL: [UploadField; 9] = [
        UploadField::PermanentResidentCard,
        UploadField::SocialSecurityStatement,
        UploadField::BirthCertificate,
        UploadField::CitizenshipProof,
        UploadField::MilitaryDischargePapers,
        UploadField::EvidenceDocuments,
        UploadField::W2Forms,
        UploadField::SelfEmploymentTaxReturns,
        UploadField::WorkersCompProof,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UploadField::PermanentResidentCard => "permanent_resident_card",
            UploadField::SocialSecurityStatement => "social_security_statement",
            UploadField::BirthCertificate => "birth_certificate",
            UploadField::CitizenshipProof => "citizenship_proof",
            UploadField::MilitaryDischargePapers => "military_discharge_papers",
            UploadField::EvidenceDocuments => "evidence_documents",
            UploadField::W2Forms => "w2_forms",
            UploadField::SelfEmploymentTaxReturns => "self_employment_tax_returns",
            UploadField::WorkersCompProof => "workers_comp_proof",
        }
    }

    pub fn category(&self) -> FileCategory {
        match self {
            UploadField::PermanentResidentCard => FileCategory::Identification,
            UploadField::SocialSecurityStatement => FileCategory::SocialSecurity,
            UploadField::BirthCertificate => FileCategory::BirthCertificate,
            UploadField::CitizenshipProof => FileCategory::Citizenship,
            UploadField::MilitaryDischargePapers => FileCategory::Military,
            UploadField::EvidenceDocuments => FileCategory::MedicalEvidence,
            UploadField::W2Forms => FileCategory::W2Forms,
            UploadField::SelfEmploymentTaxReturns => FileCategory::SelfEmploymentTaxReturns,
            UploadField::WorkersCompProof => FileCategory::WorkersCompProof,
        }
    }

    /// Maximum number of parts accepted for this field in one request
    pub fn max_count(&self) -> usize {
        match self {
            UploadField::EvidenceDocuments => 20,
            UploadField::W2Forms
            | UploadField::SelfEmploymentTaxReturns
            | UploadField::WorkersCompProof => 10,
            _ => 1,
        }
    }

    pub fn is_array(&self) -> bool {
        self.max_count() > 1
    }

    /// Whether stored files of this field carry a document year
    pub fn carries_year(&self) -> bool {
        matches!(self, UploadField::W2Forms | UploadField::SelfEmploymentTaxReturns)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.name() == name)
    }

    /// Parse a multipart part name into its field and optional correlation key.
    ///
    /// Accepts `field`, `field[]` and `field[key]`. Returns `None` for names
    /// that are not upload fields.
    pub fn parse_part_name(part_name: &str) -> Option<(Self, Option<String>)> {
        match part_name.split_once('[') {
            None => Self::from_name(part_name).map(|field| (field, None)),
            Some((base, rest)) => {
                let key = rest.strip_suffix(']')?;
                if key.contains('[') || key.contains(']') {
                    return None;
                }
                let field = Self::from_name(base)?;
                let key = if key.is_empty() { None } else { Some(key.to_string()) };
                Some((field, key))
            }
        }
    }
}

impl fmt::Display for UploadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional per-file metadata recorded alongside the blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub description: Option<String>,
    pub document_year: Option<i32>,
}

impl FileMetadata {
    /// Metadata derived from the upload itself.
    ///
    /// Evidence documents are described by their original filename. Yearly
    /// tax documents take their year from a numeric correlation key, else
    /// from the first four consecutive digits of the filename.
    pub fn for_upload(field: UploadField, file_name: &str, correlation_key: Option<&str>) -> Self {
        let description = match field {
            UploadField::EvidenceDocuments => Some(file_name.to_string()),
            _ => None,
        };

        let document_year = if field.carries_year() {
            correlation_key
                .filter(|key| !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|key| key.parse::<i32>().ok())
                .or_else(|| first_four_digits(file_name))
                .filter(|year| *year != 0)
        } else {
            None
        };

        Self { description, document_year }
    }
}

fn first_four_digits(file_name: &str) -> Option<i32> {
    file_name
        .as_bytes()
        .windows(4)
        .find(|window| window.iter().all(u8::is_ascii_digit))
        .and_then(|window| std::str::from_utf8(window).ok())
        .and_then(|digits| digits.parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    pub application_id: ApplicationId,
    pub uploaded_by: OwnerId,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub storage_bucket: String,
    pub storage_path: String,
    pub category: FileCategory,
    pub description: Option<String>,
    pub document_year: Option<i32>,
    /// Soft-delete flag consulted by read paths; never set by the pipeline
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Deterministic object key: `{owner}/{application}/{category}/{file}.{ext}`
pub fn storage_path(
    owner: OwnerId,
    application_id: ApplicationId,
    category: FileCategory,
    file_id: FileId,
    original_name: &str,
) -> String {
    format!(
        "{}/{}/{}/{}.{}",
        owner,
        application_id,
        category,
        file_id,
        file_extension(original_name)
    )
}

/// Extension of the original filename, or `pdf` when there is none
pub fn file_extension(original_name: &str) -> &str {
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or(original_name);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => FALLBACK_EXTENSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_path_layout() {
        let owner = OwnerId(Uuid::new_v4());
        let app = ApplicationId::new();
        let file = FileId::new();

        let path = storage_path(owner, app, FileCategory::W2Forms, file, "w2-2022.PNG");
        assert_eq!(path, format!("{}/{}/w2_forms/{}.PNG", owner, app, file));
    }

    #[test]
    fn test_extension_falls_back_to_pdf() {
        assert_eq!(file_extension("scan"), "pdf");
        assert_eq!(file_extension("scan."), "pdf");
        assert_eq!(file_extension(".hidden"), "pdf");
        assert_eq!(file_extension("dir.v2/scan"), "pdf");
        assert_eq!(file_extension("report.final.pdf"), "pdf");
        assert_eq!(file_extension("photo.jpeg"), "jpeg");
    }

    #[test]
    fn test_parse_part_name_variants() {
        assert_eq!(
            UploadField::parse_part_name("birth_certificate"),
            Some((UploadField::BirthCertificate, None))
        );
        assert_eq!(
            UploadField::parse_part_name("evidence_documents[]"),
            Some((UploadField::EvidenceDocuments, None))
        );
        assert_eq!(
            UploadField::parse_part_name("w2_forms[2021]"),
            Some((UploadField::W2Forms, Some("2021".to_string())))
        );
        assert_eq!(UploadField::parse_part_name("w2_forms[2021"), None);
        assert_eq!(UploadField::parse_part_name("resume"), None);
        assert_eq!(UploadField::parse_part_name("formData"), None);
    }

    #[test]
    fn test_upload_metadata() {
        let evidence = FileMetadata::for_upload(UploadField::EvidenceDocuments, "mri.pdf", None);
        assert_eq!(evidence.description.as_deref(), Some("mri.pdf"));
        assert_eq!(evidence.document_year, None);

        let keyed = FileMetadata::for_upload(UploadField::W2Forms, "w2-2019.pdf", Some("2021"));
        assert_eq!(keyed.document_year, Some(2021));

        let from_name = FileMetadata::for_upload(UploadField::SelfEmploymentTaxReturns, "return_2020_final.pdf", Some("a"));
        assert_eq!(from_name.document_year, Some(2020));

        let none = FileMetadata::for_upload(UploadField::W2Forms, "w2.pdf", None);
        assert_eq!(none.document_year, None);

        let card = FileMetadata::for_upload(UploadField::BirthCertificate, "cert-1990.pdf", None);
        assert_eq!(card, FileMetadata::default());
    }

    #[test]
    fn test_field_limits_and_categories() {
        assert_eq!(UploadField::EvidenceDocuments.max_count(), 20);
        assert_eq!(UploadField::W2Forms.max_count(), 10);
        assert_eq!(UploadField::PermanentResidentCard.max_count(), 1);
        assert!(!UploadField::CitizenshipProof.is_array());
        assert_eq!(UploadField::EvidenceDocuments.category(), FileCategory::MedicalEvidence);
        assert_eq!(UploadField::PermanentResidentCard.category(), FileCategory::Identification);
        assert_eq!(FileCategory::parse("social_security"), Some(FileCategory::SocialSecurity));
        assert_eq!(FileCategory::parse("unknown"), None);
    }
}
