//! Text extraction from preprocessed images.
//!
//! The engine sits behind a trait so the service can run without tesseract
//! installed and so tests can inject canned text. "No text found" is a valid
//! empty result; only engine-level failures (corrupt input, missing
//! traineddata) surface as errors, and the orchestrator treats those as
//! request-fatal.

use async_trait::async_trait;
use thiserror::Error;

use crate::language::Language;
use crate::preprocess::PreprocessedImage;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine initialization failed: {0}")]
    Init(String),
    #[error("OCR extraction failed: {0}")]
    Extraction(String),
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extract text from one image. An empty string means no text detected.
    async fn extract_text(
        &self,
        image: &PreprocessedImage,
        lang: Language,
    ) -> Result<String, OcrError>;
}

/// Engine used when the crate is built without tesseract. Yields empty text,
/// leaving the vision model to work from the images alone.
pub struct DisabledOcr;

#[async_trait]
impl OcrEngine for DisabledOcr {
    async fn extract_text(
        &self,
        _image: &PreprocessedImage,
        lang: Language,
    ) -> Result<String, OcrError> {
        tracing::debug!(lang = %lang, "OCR engine disabled, returning empty text");
        Ok(String::new())
    }
}

#[cfg(feature = "ocr-tesseract")]
pub use self::tesseract_engine::TesseractOcr;

#[cfg(feature = "ocr-tesseract")]
mod tesseract_engine {
    use super::*;
    use std::path::PathBuf;

    /// Tesseract-backed extractor. Language codes map onto the engine's
    /// traineddata models (en -> eng, hi -> hin, mr -> mar).
    pub struct TesseractOcr {
        tessdata_dir: Option<PathBuf>,
    }

    impl TesseractOcr {
        /// `tessdata_dir` of `None` lets tesseract use its compiled-in
        /// default data path.
        pub fn new(tessdata_dir: Option<PathBuf>) -> Self {
            Self { tessdata_dir }
        }
    }

    #[async_trait]
    impl OcrEngine for TesseractOcr {
        async fn extract_text(
            &self,
            image: &PreprocessedImage,
            lang: Language,
        ) -> Result<String, OcrError> {
            let data = image.data.clone();
            let datapath = self
                .tessdata_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());
            let model = lang.tesseract_model();

            // Tesseract is blocking CPU work; keep it off the reactor.
            let text = tokio::task::spawn_blocking(move || -> Result<String, OcrError> {
                let tess = tesseract::Tesseract::new(datapath.as_deref(), Some(model))
                    .map_err(|e| OcrError::Init(format!("{e:?}")))?;
                let mut tess = tess
                    .set_image_from_mem(&data)
                    .map_err(|e| OcrError::Extraction(format!("{e:?}")))?;
                tess.get_text()
                    .map_err(|e| OcrError::Extraction(format!("{e:?}")))
            })
            .await
            .map_err(|e| OcrError::Extraction(format!("OCR task join failed: {e}")))??;

            tracing::info!(
                lang = %lang,
                chars = text.len(),
                "tesseract extraction completed"
            );
            Ok(text)
        }
    }
}
