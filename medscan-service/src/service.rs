//! HTTP surface: upload boundary, analysis routes, history, TTS proxy.
//!
//! Upload constraints (JPEG/PNG only, 5MB per file) are enforced here, before
//! any pipeline stage runs. Every failure the caller sees is structured JSON,
//! never a raw error trace.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use medscan_pipeline::Language;

use crate::analysis::{AnalysisPipeline, UploadedImage};
use crate::history::HistoryStore;
use crate::tts::{TtsClient, TtsOutcome};

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

/// Per-file upload cap. Checked per file, so the body limit below is larger
/// to accommodate multi-image report submissions.
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const SUPPORTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png"];

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub history: Arc<dyn HistoryStore>,
    pub tts: TtsClient,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/prescriptions/analyze", post(analyze_prescription))
        .route("/api/reports/analyze", post(analyze_report))
        .route("/api/history", get(get_history))
        .route("/api/tts/synthesize", post(tts_synthesize))
        .route("/api/tts/health", get(tts_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn analyze_prescription(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Value> {
    let (files, lang) = read_upload(multipart).await?;

    let mut files = files.into_iter();
    let file = match (files.next(), files.next()) {
        (None, _) => return Err(bad_request_error("No file uploaded")),
        (Some(_), Some(_)) => {
            return Err(bad_request_error("Expected a single prescription image"));
        }
        (Some(file), None) => file,
    };

    match state.pipeline.analyze_prescription(file, lang).await {
        // Document mismatch is a structured 200 body the caller inspects.
        Ok(record) if record.is_error() => Ok(Json(json!(record))),
        Ok(record) => Ok(Json(json!({ "result": record }))),
        Err(e) => {
            error!("prescription analysis error: {}", e);
            Err(internal_error("Analysis failed", &e.to_string()))
        }
    }
}

async fn analyze_report(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Value> {
    let (files, lang) = read_upload(multipart).await?;

    if files.is_empty() {
        return Err(bad_request_error("At least one image required"));
    }

    match state.pipeline.analyze_report(files, lang).await {
        Ok(analysis) => Ok(Json(json!({
            "ocrText": analysis.ocr_text,
            "result": analysis.record
        }))),
        Err(e) => {
            error!("report analysis error: {}", e);
            Err(internal_error("Processing failed", &e.to_string()))
        }
    }
}

/// Drain the multipart form into validated uploads plus the language code.
/// Rejects wrong MIME types and oversize files before any pipeline stage.
async fn read_upload(mut multipart: Multipart) -> Result<(Vec<UploadedImage>, Language), ApiError> {
    let mut files = Vec::new();
    let mut lang = Language::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request_error("Invalid multipart payload"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "files" | "files[]" => {
                let mime_type = field.content_type().unwrap_or_default().to_string();
                let file_name = field.file_name().map(str::to_string);

                if !SUPPORTED_MIME_TYPES.contains(&mime_type.as_str()) {
                    return Err(bad_request_error("Only JPG/PNG allowed"));
                }

                let data = field
                    .bytes()
                    .await
                    .map_err(|_| bad_request_error("Failed to read uploaded file"))?;

                if data.len() > MAX_UPLOAD_BYTES {
                    return Err(bad_request_error("File too large (max 5MB)"));
                }

                files.push(UploadedImage {
                    data: data.to_vec(),
                    mime_type,
                    file_name,
                });
            }
            "lang" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| bad_request_error("Invalid multipart payload"))?;
                lang = Language::parse(Some(&value));
            }
            other => {
                info!(field = %other, "ignoring unexpected multipart field");
            }
        }
    }

    Ok((files, lang))
}

async fn get_history(State(state): State<AppState>) -> ApiResult<Value> {
    match state.history.list(100).await {
        Ok(entries) => Ok(Json(json!(entries))),
        Err(e) => {
            error!("failed to load history: {}", e);
            Err(internal_error("Failed to load history", &e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TtsRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: String,
}

async fn tts_synthesize(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    if request.text.trim().is_empty() || request.language.trim().is_empty() {
        return Err(bad_request_error("Missing text or language parameter"));
    }
    if !["en", "hi", "mr"].contains(&request.language.as_str()) {
        return Err(bad_request_error("Unsupported language. Use: en, hi, mr"));
    }

    info!(
        language = %request.language,
        chars = request.text.len(),
        "TTS synthesis requested"
    );

    match state.tts.synthesize(&request.text, &request.language).await {
        TtsOutcome::Audio { content_type, data } => {
            Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
        }
        TtsOutcome::Unavailable { message } => Ok(Json(json!({
            "success": false,
            "fallback": "web_speech_api",
            "message": message
        }))
        .into_response()),
    }
}

async fn tts_health(State(state): State<AppState>) -> Json<Value> {
    let available = state.tts.is_available().await;
    Json(json!({
        "status": "healthy",
        "tts_available": available,
        "supported_languages": ["en", "hi", "mr"],
        "fallback_available": true
    }))
}
