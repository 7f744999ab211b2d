//! Document-analysis pipeline for photographed medical documents.
//!
//! Stages, in order: image normalization ([`preprocess`]), OCR extraction
//! ([`ocr`]), prompt construction ([`prompt`]), model invocation ([`model`]),
//! and output normalization ([`normalize`]) into the strict records of
//! [`records`]. Orchestration, HTTP, and persistence live in the service
//! crate; everything here is independently testable.

pub mod language;
pub mod model;
pub mod normalize;
pub mod ocr;
pub mod preprocess;
pub mod prompt;
pub mod records;

// Re-export commonly used types
pub use language::Language;
pub use model::{
    GeminiClient, GeminiConfig, InlineImage, ModelClient, ModelError, ModelReply, RetryPolicy,
};
pub use normalize::normalize;
pub use ocr::{DisabledOcr, OcrEngine, OcrError};
pub use preprocess::{ImagePreprocessor, PreprocessedImage};
pub use prompt::build_prompt;
pub use records::{
    Abnormality, AnalysisRecord, DocumentType, Flag, Medicine, PrescriptionRecord, ReportRecord,
    WrongImageType, fallback_record, unavailable_record,
};

#[cfg(feature = "ocr-tesseract")]
pub use ocr::TesseractOcr;
