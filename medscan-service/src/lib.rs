pub mod analysis;
pub mod config;
pub mod history;
pub mod service;
pub mod tts;

use std::sync::Arc;

use axum::Router;
use tracing::{error, warn};

use medscan_pipeline::{GeminiClient, GeminiConfig, ImagePreprocessor, OcrEngine};

pub use analysis::{AnalysisPipeline, UploadedImage};
pub use config::ServiceConfig;
pub use history::{HistoryEntry, HistoryStore, InMemoryHistoryStore, PostgresHistoryStore};
pub use service::{AppState, build_router};
pub use tts::TtsClient;

/// Assemble the full application from configuration: history store, OCR
/// engine, model client, pipeline, and router.
pub async fn create_app(config: ServiceConfig) -> Router {
    let history = create_history_store(&config).await;
    let ocr = create_ocr_engine(&config);

    let model = Arc::new(GeminiClient::new(GeminiConfig {
        api_key: config.gemini_api_key.clone(),
        model: config.gemini_model.clone(),
        ..GeminiConfig::default()
    }));

    let pipeline = Arc::new(AnalysisPipeline::new(
        ImagePreprocessor::default(),
        ocr,
        model,
        history.clone(),
    ));

    let app_state = AppState {
        pipeline,
        history,
        tts: TtsClient::new(config.tts_service_url.clone()),
    };

    build_router(app_state)
}

async fn create_history_store(config: &ServiceConfig) -> Arc<dyn HistoryStore> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, history is in-memory for this process");
        return Arc::new(InMemoryHistoryStore::new());
    };

    match PostgresHistoryStore::connect(database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            // History is best effort; a missing database degrades, not aborts.
            error!("failed to connect to Postgres, history is in-memory: {}", e);
            Arc::new(InMemoryHistoryStore::new())
        }
    }
}

#[cfg(feature = "ocr-tesseract")]
fn create_ocr_engine(config: &ServiceConfig) -> Arc<dyn OcrEngine> {
    Arc::new(medscan_pipeline::TesseractOcr::new(config.tessdata_dir.clone()))
}

#[cfg(not(feature = "ocr-tesseract"))]
fn create_ocr_engine(config: &ServiceConfig) -> Arc<dyn OcrEngine> {
    if config.tessdata_dir.is_some() {
        warn!("TESSDATA_DIR set but the ocr-tesseract feature is not compiled in");
    }
    Arc::new(medscan_pipeline::DisabledOcr)
}
