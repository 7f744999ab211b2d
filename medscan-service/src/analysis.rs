//! Per-request analysis orchestration.
//!
//! Each request moves through preprocess -> OCR -> prompt -> model ->
//! normalize -> persist. Multi-image report requests run preprocessing and
//! OCR per file in submission order, concatenate the texts with a blank line
//! between them, and make a single combined model call covering all images.
//! Every external call is attempted once per request; only OCR and model
//! failures are request-fatal, and history persistence never is.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use medscan_pipeline::{
    AnalysisRecord, DocumentType, ImagePreprocessor, InlineImage, Language, ModelClient,
    ModelError, ModelReply, OcrEngine, OcrError, build_prompt, normalize, unavailable_record,
};

use crate::history::{HistoryEntry, HistoryStore};

/// One uploaded file, already past the upload-boundary checks.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// Report analyses return the combined OCR text alongside the record.
#[derive(Debug)]
pub struct ReportAnalysis {
    pub ocr_text: String,
    pub record: AnalysisRecord,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("OCR extraction failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("model invocation failed: {0}")]
    Model(#[from] ModelError),
}

/// Persisted prescription OCR text is bounded to this many characters.
const OCR_HISTORY_LIMIT: usize = 1000;

pub struct AnalysisPipeline {
    preprocessor: ImagePreprocessor,
    ocr: Arc<dyn OcrEngine>,
    model: Arc<dyn ModelClient>,
    history: Arc<dyn HistoryStore>,
}

impl AnalysisPipeline {
    pub fn new(
        preprocessor: ImagePreprocessor,
        ocr: Arc<dyn OcrEngine>,
        model: Arc<dyn ModelClient>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            preprocessor,
            ocr,
            model,
            history,
        }
    }

    /// Analyze a single prescription image.
    pub async fn analyze_prescription(
        &self,
        file: UploadedImage,
        lang: Language,
    ) -> Result<AnalysisRecord, AnalysisError> {
        info!(
            file = file.file_name.as_deref().unwrap_or("<unnamed>"),
            lang = %lang,
            "starting prescription analysis"
        );

        let (ocr_text, images) = self.extract(vec![file], lang).await?;
        let record = self
            .invoke_model(DocumentType::Prescription, &ocr_text, &images, lang)
            .await?;

        self.persist(
            DocumentType::Prescription,
            truncate_chars(&ocr_text, OCR_HISTORY_LIMIT),
            &record,
            lang,
        )
        .await;

        Ok(record)
    }

    /// Analyze one or more lab report images as a single document.
    pub async fn analyze_report(
        &self,
        files: Vec<UploadedImage>,
        lang: Language,
    ) -> Result<ReportAnalysis, AnalysisError> {
        info!(files = files.len(), lang = %lang, "starting report analysis");

        let (ocr_text, images) = self.extract(files, lang).await?;
        let record = self
            .invoke_model(DocumentType::Report, &ocr_text, &images, lang)
            .await?;

        self.persist(DocumentType::Report, ocr_text.clone(), &record, lang)
            .await;

        Ok(ReportAnalysis { ocr_text, record })
    }

    /// Preprocess and OCR each file in submission order; texts are joined
    /// with a blank line so the model sees one document.
    async fn extract(
        &self,
        files: Vec<UploadedImage>,
        lang: Language,
    ) -> Result<(String, Vec<InlineImage>), AnalysisError> {
        let mut texts = Vec::with_capacity(files.len());
        let mut images = Vec::with_capacity(files.len());

        for file in files {
            let normalized = self.preprocessor.normalize(file.data, &file.mime_type).await;
            let text = self.ocr.extract_text(&normalized, lang).await?;
            texts.push(text);
            images.push(InlineImage::from_bytes(&normalized.data, &normalized.mime_type));
        }

        Ok((texts.join("\n\n"), images))
    }

    async fn invoke_model(
        &self,
        doc_type: DocumentType,
        ocr_text: &str,
        images: &[InlineImage],
        lang: Language,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let prompt = build_prompt(doc_type, ocr_text, lang);
        match self.model.generate(&prompt, images).await? {
            ModelReply::Text(text) => Ok(normalize(&text, doc_type, lang)),
            ModelReply::Unconfigured => Ok(unavailable_record(doc_type, lang)),
        }
    }

    /// Best-effort history write, skipped entirely for error-variant records.
    async fn persist(
        &self,
        doc_type: DocumentType,
        ocr_text: String,
        record: &AnalysisRecord,
        lang: Language,
    ) {
        if record.is_error() {
            info!(doc_type = doc_type.as_str(), "wrong document type, skipping history");
            return;
        }

        let summary = match serde_json::to_value(record) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("failed to serialize record for history: {}", e);
                return;
            }
        };

        let entry = HistoryEntry::new(doc_type, ocr_text, summary, None, lang.code().to_string());
        if let Err(e) = self.history.append(entry).await {
            warn!(doc_type = doc_type.as_str(), "history append failed: {}", e);
        }
    }
}

/// Truncate on a character boundary; the OCR text is frequently Devanagari.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let devanagari = "दवा".repeat(600);
        let truncated = truncate_chars(&devanagari, 1000);
        assert_eq!(truncated.chars().count(), 1000);

        let short = "abc";
        assert_eq!(truncate_chars(short, 1000), "abc");
    }
}
