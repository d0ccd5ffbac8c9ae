// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Schema Transformer
//!
//! Maps the loosely-typed form document posted by the applicant frontend,
//! plus the identifiers of the files stored for the submission, onto the flat
//! [`ApplicationRecord`] persisted on the application row.
//!
//! The transformation is a pure function: no clock, no I/O, and the same
//! input always yields the same record. Every section of the output is
//! present and well-typed even when the input omits it:
//!
//! | Input | Output | Default |
//! |-------|--------|---------|
//! | `contact_who_knows_your_condition` | `emergency_contact` | `{}` |
//! | `non_self_employment` | `employment_history` | `[]` |
//! | `self_employment` | `self_employment_history` | `[]` |
//! | `service_records` | `military_service_records` | `[]` |
//! | `tests` | `medical_tests` | `[]` |
//! | `functional_limitations` | `functional_limitations` | `{}` |
//! | any other array section | same name | `[]` |
//!
//! Array sections that reference uploads (`evidence_documents`, `w2_forms`,
//! `self_employment_tax_returns`, `workers_comp_proof`) resolve their
//! `file_id` through [`FileIdMap`]: an entry carrying a `file_key` is matched
//! to the file uploaded under the same multipart key, any other entry takes
//! the stored file at the same position. Missing files resolve to `null`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure form-to-record mapping

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::application::OwnerId;
use crate::domain::stored_file::{FileId, UploadField};

/// Every step of the thirteen-step form, recorded as complete on submission
pub const FINAL_STEP: i32 = 13;

/// Entry key a client may use to tie an array entry to a keyed upload
const FILE_KEY: &str = "file_key";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("Form data must be valid JSON")]
    InvalidFormData(String),
}

/// Form payload as received: raw multipart text or an already-parsed document
#[derive(Debug, Clone, PartialEq)]
pub enum RawForm {
    Text(String),
    Parsed(Value),
}

impl RawForm {
    /// Parse into a JSON object; an empty text payload is an empty form
    pub fn parse(&self) -> Result<ParsedForm, TransformError> {
        let value = match self {
            RawForm::Text(text) if text.trim().is_empty() => Value::Object(Map::new()),
            RawForm::Text(text) => serde_json::from_str(text)
                .map_err(|e| TransformError::InvalidFormData(e.to_string()))?,
            RawForm::Parsed(value) => value.clone(),
        };

        match value {
            Value::Object(map) => Ok(ParsedForm(map)),
            other => Err(TransformError::InvalidFormData(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }
}

/// A form document known to be a JSON object
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedForm(Map<String, Value>);

impl ParsedForm {
    pub fn into_raw(self) -> RawForm {
        RawForm::Parsed(Value::Object(self.0))
    }

    /// The applicant's national identifier, when one was entered
    pub fn ssn(&self) -> Option<String> {
        match self.0.get("ssn") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

// ============================================================================
// Stored file identifiers
// ============================================================================

/// One stored file of an array upload field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub file_id: FileId,
    pub correlation_key: Option<String>,
}

/// Identifiers of the files stored for one submission attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIdMap {
    singles: HashMap<UploadField, FileId>,
    arrays: HashMap<UploadField, Vec<FileRef>>,
}

impl FileIdMap {
    pub fn record(&mut self, field: UploadField, file_id: FileId, correlation_key: Option<String>) {
        if field.is_array() {
            self.arrays
                .entry(field)
                .or_default()
                .push(FileRef { file_id, correlation_key });
        } else {
            self.singles.insert(field, file_id);
        }
    }

    pub fn single(&self, field: UploadField) -> Option<FileId> {
        self.singles.get(&field).copied()
    }

    pub fn refs(&self, field: UploadField) -> &[FileRef] {
        self.arrays.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keyed match when a key is given, positional match otherwise
    pub fn resolve(&self, field: UploadField, index: usize, key: Option<&str>) -> Option<FileId> {
        let refs = self.refs(field);
        match key {
            Some(key) => refs
                .iter()
                .find(|r| r.correlation_key.as_deref() == Some(key))
                .map(|r| r.file_id),
            None => refs.get(index).map(|r| r.file_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.arrays.values().all(Vec::is_empty)
    }
}

// ============================================================================
// Persistence record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceDocumentEntry {
    pub document_type: String,
    pub description: String,
    pub file_id: Option<FileId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearlyDocumentEntry {
    pub year: Option<i32>,
    pub file_id: Option<FileId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersCompEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub file_id: Option<FileId>,
}

/// Flat record written to the application row on submission.
///
/// Sections hold independently serialized JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationRecord {
    #[serde(skip_serializing)]
    pub applicant_id: OwnerId,
    pub birthdate: Option<String>,
    pub birthplace: Option<String>,
    pub permanent_resident_card_file_id: Option<FileId>,
    pub spouses: String,
    pub children: String,
    pub direct_deposit_type: String,
    pub direct_deposit_domestic: Option<String>,
    pub direct_deposit_international: Option<String>,
    pub emergency_contact: String,
    pub date_condition_began_affecting_work: Option<String>,
    pub employment_history: String,
    pub self_employment_history: String,
    pub earnings_history: String,
    pub served_in_us_military: bool,
    pub military_service_records: String,
    pub education: String,
    pub special_education: String,
    pub job_training: String,
    pub disability_benefits: String,
    pub conditions: String,
    pub functional_limitations: String,
    pub healthcare_providers: String,
    pub medical_tests: String,
    pub medications: String,
    pub evidence_documents: String,
    pub other_record_sources: String,
    pub social_security_statement_file_id: Option<FileId>,
    pub birth_certificate_file_id: Option<FileId>,
    pub citizenship_proof_file_id: Option<FileId>,
    pub military_discharge_papers_file_id: Option<FileId>,
    pub w2_forms: String,
    pub self_employment_tax_returns: String,
    pub workers_comp_proof: String,
    #[serde(skip_serializing)]
    pub current_step: i32,
    pub steps_completed: String,
}

/// Parse the raw payload and transform it
pub fn transform(
    form: &RawForm,
    files: &FileIdMap,
    owner: OwnerId,
) -> Result<ApplicationRecord, TransformError> {
    Ok(transform_parsed(&form.parse()?, files, owner))
}

pub fn transform_parsed(form: &ParsedForm, files: &FileIdMap, owner: OwnerId) -> ApplicationRecord {
    let evidence_documents: Vec<EvidenceDocumentEntry> = entries(form, "evidence_documents")
        .enumerate()
        .map(|(index, doc)| EvidenceDocumentEntry {
            document_type: text_or(doc, "document_type", "other"),
            description: text_or(doc, "description", ""),
            file_id: files.resolve(UploadField::EvidenceDocuments, index, file_key(doc)),
        })
        .collect();

    let w2_forms = yearly_entries(form, files, UploadField::W2Forms);
    let tax_returns = yearly_entries(form, files, UploadField::SelfEmploymentTaxReturns);

    let workers_comp: Vec<WorkersCompEntry> = entries(form, "workers_comp_proof")
        .enumerate()
        .map(|(index, proof)| WorkersCompEntry {
            kind: text_or(proof, "type", "other"),
            description: text_or(proof, "description", ""),
            file_id: files.resolve(UploadField::WorkersCompProof, index, file_key(proof)),
        })
        .collect();

    let deposit = form.get("direct_deposit").and_then(Value::as_object);
    let deposit_type = deposit
        .map(|d| text_or(d, "type", "none"))
        .unwrap_or_else(|| "none".to_string());
    let deposit_variant = |variant: &str| {
        if deposit_type != variant {
            return None;
        }
        deposit
            .and_then(|d| d.get(variant))
            .filter(|v| !v.is_null())
            .map(Value::to_string)
    };

    ApplicationRecord {
        applicant_id: owner,
        birthdate: optional_text(form.get("birthdate")),
        birthplace: optional_text(form.get("birthplace")),
        permanent_resident_card_file_id: files.single(UploadField::PermanentResidentCard),
        spouses: array_section(form, "spouses"),
        children: array_section(form, "children"),
        direct_deposit_domestic: deposit_variant("domestic"),
        direct_deposit_international: deposit_variant("international"),
        direct_deposit_type: deposit_type.clone(),
        emergency_contact: object_section(form, "contact_who_knows_your_condition"),
        date_condition_began_affecting_work: optional_text(
            form.get("date_condition_began_affecting_work_ability"),
        ),
        employment_history: array_section(form, "non_self_employment"),
        self_employment_history: array_section(form, "self_employment"),
        earnings_history: array_section(form, "earnings_history"),
        served_in_us_military: truthy(form.get("served_in_us_military")),
        military_service_records: array_section(form, "service_records"),
        education: array_section(form, "education"),
        special_education: array_section(form, "special_education"),
        job_training: array_section(form, "job_training"),
        disability_benefits: array_section(form, "disability_benefits"),
        conditions: array_section(form, "conditions"),
        functional_limitations: object_section(form, "functional_limitations"),
        healthcare_providers: array_section(form, "healthcare_providers"),
        medical_tests: array_section(form, "tests"),
        medications: array_section(form, "medications"),
        evidence_documents: to_json(&evidence_documents),
        other_record_sources: array_section(form, "other_record_sources"),
        social_security_statement_file_id: files.single(UploadField::SocialSecurityStatement),
        birth_certificate_file_id: files.single(UploadField::BirthCertificate),
        citizenship_proof_file_id: files.single(UploadField::CitizenshipProof),
        military_discharge_papers_file_id: files.single(UploadField::MilitaryDischargePapers),
        w2_forms: to_json(&w2_forms),
        self_employment_tax_returns: to_json(&tax_returns),
        workers_comp_proof: to_json(&workers_comp),
        current_step: FINAL_STEP,
        steps_completed: to_json(&(1..=FINAL_STEP).collect::<Vec<i32>>()),
    }
}

/// Integer prefix parse of a year value; unparsable and zero become `None`
pub fn coerce_year(value: Option<&Value>) -> Option<i32> {
    let parsed = match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_int_prefix(s),
        _ => None,
    }?;

    i32::try_from(parsed).ok().filter(|year| *year != 0)
}

fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn yearly_entries(form: &ParsedForm, files: &FileIdMap, field: UploadField) -> Vec<YearlyDocumentEntry> {
    entries(form, field.name())
        .enumerate()
        .map(|(index, entry)| YearlyDocumentEntry {
            year: coerce_year(entry.get("year")),
            file_id: files.resolve(field, index, file_key(entry)),
        })
        .collect()
}

/// Entries of an array section; non-object entries read as empty objects
fn entries<'a>(form: &'a ParsedForm, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    let empty = EMPTY.get_or_init(Map::new);
    form.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(move |entry| entry.as_object().unwrap_or(empty))
}

fn file_key(entry: &Map<String, Value>) -> Option<&str> {
    entry
        .get(FILE_KEY)
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
}

fn text_or(entry: &Map<String, Value>, key: &str, default: &str) -> String {
    optional_text(entry.get(key)).unwrap_or_else(|| default.to_string())
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn array_section(form: &ParsedForm, key: &str) -> String {
    match form.get(key) {
        Some(value @ Value::Array(_)) => value.to_string(),
        _ => "[]".to_string(),
    }
}

fn object_section(form: &ParsedForm, key: &str) -> String {
    match form.get(key) {
        Some(value @ Value::Object(_)) => value.to_string(),
        _ => "{}".to_string(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    // Serializing plain structs, vectors and integers into a String cannot fail
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn owner() -> OwnerId {
        OwnerId(Uuid::new_v4())
    }

    fn parsed(value: Value) -> ParsedForm {
        RawForm::Parsed(value).parse().unwrap()
    }

    #[test]
    fn test_empty_form_fills_every_default() {
        let record = transform(&RawForm::Text("{}".into()), &FileIdMap::default(), owner()).unwrap();

        for section in [
            &record.spouses,
            &record.children,
            &record.employment_history,
            &record.self_employment_history,
            &record.earnings_history,
            &record.military_service_records,
            &record.education,
            &record.special_education,
            &record.job_training,
            &record.disability_benefits,
            &record.conditions,
            &record.healthcare_providers,
            &record.medical_tests,
            &record.medications,
            &record.evidence_documents,
            &record.other_record_sources,
            &record.w2_forms,
            &record.self_employment_tax_returns,
            &record.workers_comp_proof,
        ] {
            assert_eq!(section, "[]");
        }
        assert_eq!(record.emergency_contact, "{}");
        assert_eq!(record.functional_limitations, "{}");
        assert_eq!(record.direct_deposit_type, "none");
        assert!(record.direct_deposit_domestic.is_none());
        assert!(!record.served_in_us_military);
        assert_eq!(record.current_step, 13);
        assert_eq!(record.steps_completed, "[1,2,3,4,5,6,7,8,9,10,11,12,13]");
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = transform(&RawForm::Text("{not json".into()), &FileIdMap::default(), owner()).unwrap_err();
        assert!(matches!(err, TransformError::InvalidFormData(_)));
        assert_eq!(err.to_string(), "Form data must be valid JSON");

        assert!(RawForm::Text("[1, 2]".into()).parse().is_err());
        assert!(RawForm::Parsed(Value::Null).parse().is_err());
        assert!(RawForm::Text("   ".into()).parse().is_ok());
    }

    #[test]
    fn test_transform_is_deterministic() {
        let form = RawForm::Text(
            json!({
                "birthdate": "1980-02-03",
                "conditions": [{"name": "back injury"}],
                "w2_forms": [{"year": "2021"}],
            })
            .to_string(),
        );
        let mut files = FileIdMap::default();
        files.record(UploadField::W2Forms, FileId::new(), None);
        let owner = owner();

        let first = serde_json::to_string(&transform(&form, &files, owner).unwrap()).unwrap();
        let second = serde_json::to_string(&transform(&form, &files, owner).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_renamed_sections() {
        let form = parsed(json!({
            "contact_who_knows_your_condition": {"name": "Sam"},
            "non_self_employment": [{"employer": "Acme"}],
            "self_employment": [{"business": "Shop"}],
            "service_records": [{"branch": "Navy"}],
            "tests": [{"name": "MRI"}],
            "date_condition_began_affecting_work_ability": "2020-01-01",
        }));
        let record = transform_parsed(&form, &FileIdMap::default(), owner());

        assert_eq!(record.emergency_contact, r#"{"name":"Sam"}"#);
        assert_eq!(record.employment_history, r#"[{"employer":"Acme"}]"#);
        assert_eq!(record.self_employment_history, r#"[{"business":"Shop"}]"#);
        assert_eq!(record.military_service_records, r#"[{"branch":"Navy"}]"#);
        assert_eq!(record.medical_tests, r#"[{"name":"MRI"}]"#);
        assert_eq!(record.date_condition_began_affecting_work.as_deref(), Some("2020-01-01"));
    }

    #[test]
    fn test_wrong_typed_sections_default() {
        let form = parsed(json!({
            "spouses": "none",
            "functional_limitations": [1, 2],
            "birthdate": "",
            "birthplace": 12,
        }));
        let record = transform_parsed(&form, &FileIdMap::default(), owner());

        assert_eq!(record.spouses, "[]");
        assert_eq!(record.functional_limitations, "{}");
        assert!(record.birthdate.is_none());
        assert!(record.birthplace.is_none());
    }

    #[test]
    fn test_positional_file_association_with_missing_files() {
        let form = parsed(json!({
            "evidence_documents": [
                {"document_type": "medical_record", "description": "MRI report"},
                {"description": "Letter"},
                {},
            ],
        }));
        let first = FileId::new();
        let second = FileId::new();
        let mut files = FileIdMap::default();
        files.record(UploadField::EvidenceDocuments, first, None);
        files.record(UploadField::EvidenceDocuments, second, None);

        let record = transform_parsed(&form, &files, owner());
        let docs: Vec<EvidenceDocumentEntry> = serde_json::from_str(&record.evidence_documents).unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].document_type, "medical_record");
        assert_eq!(docs[0].file_id, Some(first));
        assert_eq!(docs[1].document_type, "other");
        assert_eq!(docs[1].file_id, Some(second));
        assert_eq!(docs[2].description, "");
        assert_eq!(docs[2].file_id, None);
    }

    #[test]
    fn test_keyed_file_association() {
        let form = parsed(json!({
            "w2_forms": [
                {"year": "2022", "file_key": "b"},
                {"year": "2021", "file_key": "a"},
                {"year": "2020", "file_key": "missing"},
            ],
        }));
        let a = FileId::new();
        let b = FileId::new();
        let mut files = FileIdMap::default();
        files.record(UploadField::W2Forms, a, Some("a".into()));
        files.record(UploadField::W2Forms, b, Some("b".into()));

        let record = transform_parsed(&form, &files, owner());
        let w2: Vec<YearlyDocumentEntry> = serde_json::from_str(&record.w2_forms).unwrap();

        assert_eq!(w2[0], YearlyDocumentEntry { year: Some(2022), file_id: Some(b) });
        assert_eq!(w2[1], YearlyDocumentEntry { year: Some(2021), file_id: Some(a) });
        assert_eq!(w2[2], YearlyDocumentEntry { year: Some(2020), file_id: None });
    }

    #[test]
    fn test_single_file_ids_are_copied() {
        let card = FileId::new();
        let mut files = FileIdMap::default();
        files.record(UploadField::PermanentResidentCard, card, None);

        let record = transform_parsed(&parsed(json!({})), &files, owner());
        assert_eq!(record.permanent_resident_card_file_id, Some(card));
        assert_eq!(record.birth_certificate_file_id, None);
    }

    #[test]
    fn test_year_coercion() {
        assert_eq!(coerce_year(Some(&json!("2021"))), Some(2021));
        assert_eq!(coerce_year(Some(&json!(" 2019abc"))), Some(2019));
        assert_eq!(coerce_year(Some(&json!(2018))), Some(2018));
        assert_eq!(coerce_year(Some(&json!(2017.9))), Some(2017));
        assert_eq!(coerce_year(Some(&json!("abc"))), None);
        assert_eq!(coerce_year(Some(&json!(""))), None);
        assert_eq!(coerce_year(Some(&json!("0"))), None);
        assert_eq!(coerce_year(Some(&json!(null))), None);
        assert_eq!(coerce_year(Some(&json!("99999999999"))), None);
        assert_eq!(coerce_year(None), None);
    }

    #[test]
    fn test_direct_deposit_variant_matches_type() {
        let form = parsed(json!({
            "direct_deposit": {
                "type": "domestic",
                "domestic": {"routing": "123"},
                "international": {"iban": "X"},
            },
        }));
        let record = transform_parsed(&form, &FileIdMap::default(), owner());

        assert_eq!(record.direct_deposit_type, "domestic");
        assert_eq!(record.direct_deposit_domestic.as_deref(), Some(r#"{"routing":"123"}"#));
        assert!(record.direct_deposit_international.is_none());
    }

    #[test]
    fn test_workers_comp_defaults() {
        let form = parsed(json!({"workers_comp_proof": [{"description": "claim"}, "junk"]}));
        let record = transform_parsed(&form, &FileIdMap::default(), owner());

        assert_eq!(
            record.workers_comp_proof,
            r#"[{"type":"other","description":"claim","file_id":null},{"type":"other","description":"","file_id":null}]"#
        );
    }

    #[test]
    fn test_military_flag_coercion() {
        assert!(transform_parsed(&parsed(json!({"served_in_us_military": true})), &FileIdMap::default(), owner()).served_in_us_military);
        assert!(transform_parsed(&parsed(json!({"served_in_us_military": "yes"})), &FileIdMap::default(), owner()).served_in_us_military);
        assert!(!transform_parsed(&parsed(json!({"served_in_us_military": "no"})), &FileIdMap::default(), owner()).served_in_us_military);
    }

    #[test]
    fn test_ssn_extraction() {
        assert_eq!(parsed(json!({"ssn": " 123-45-6789 "})).ssn().as_deref(), Some("123-45-6789"));
        assert_eq!(parsed(json!({"ssn": ""})).ssn(), None);
        assert_eq!(parsed(json!({})).ssn(), None);
    }
}
