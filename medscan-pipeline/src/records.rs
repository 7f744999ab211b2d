//! Structured analysis records: the pipeline's output contract.
//!
//! Field names are fixed English identifiers; field values are in the
//! requested language. The union is untagged because the wire shapes are
//! disjoint (an `error` marker, a `medicines` list, a `diseases` list).

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Which prompt template and output schema apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Prescription,
    Report,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Prescription => "prescription",
            DocumentType::Report => "report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisRecord {
    WrongImageType(WrongImageType),
    Prescription(PrescriptionRecord),
    Report(ReportRecord),
}

impl AnalysisRecord {
    /// Document-mismatch records short-circuit history persistence.
    pub fn is_error(&self) -> bool {
        matches!(self, AnalysisRecord::WrongImageType(_))
    }
}

/// Structured signal that the uploaded image did not match the expected
/// document type. Returned with HTTP 200; callers inspect the `error` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrongImageType {
    pub error: String,
    pub message: String,
}

impl WrongImageType {
    pub const MARKER: &'static str = "wrong_image_type";

    pub fn new(message: String) -> Self {
        Self {
            error: Self::MARKER.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionRecord {
    #[serde(default)]
    pub medicines: Vec<Medicine>,
    #[serde(default)]
    pub indication: String,
    #[serde(default)]
    pub generics: Vec<String>,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(default)]
    pub diseases: Vec<String>,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub abnormalities: Vec<Abnormality>,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Abnormality {
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub flag: Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    High,
    Low,
    Normal,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Fixed record returned when no structured output could be recovered from
/// the model's text. The pipeline always answers with a record, never with a
/// parse error.
pub fn fallback_record(doc_type: DocumentType, lang: Language) -> AnalysisRecord {
    match doc_type {
        DocumentType::Prescription => AnalysisRecord::Prescription(PrescriptionRecord {
            medicines: Vec::new(),
            indication: lang.indication_fallback().to_string(),
            generics: vec![lang.generics_unavailable().to_string()],
            stage: lang.stage_fallback().to_string(),
            language: lang.code().to_string(),
        }),
        DocumentType::Report => AnalysisRecord::Report(ReportRecord {
            diseases: vec!["Unknown".to_string()],
            stage: "mild".to_string(),
            abnormalities: Vec::new(),
            language: lang.code().to_string(),
        }),
    }
}

/// Canned record returned when no model credential is configured. A deliberate
/// degraded mode so the service stays usable in development.
pub fn unavailable_record(doc_type: DocumentType, lang: Language) -> AnalysisRecord {
    match doc_type {
        DocumentType::Prescription => AnalysisRecord::Prescription(PrescriptionRecord {
            medicines: Vec::new(),
            indication: "unknown".to_string(),
            generics: vec![lang.generics_unavailable().to_string()],
            stage: "unknown".to_string(),
            language: lang.code().to_string(),
        }),
        DocumentType::Report => AnalysisRecord::Report(ReportRecord {
            diseases: vec!["Unknown".to_string()],
            stage: "unknown".to_string(),
            abnormalities: Vec::new(),
            language: lang.code().to_string(),
        }),
    }
}
