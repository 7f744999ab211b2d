use std::path::PathBuf;

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Absent key puts the model client into its canned-output degraded mode.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Absent URL means history lives in memory for the process lifetime.
    pub database_url: Option<String>,
    pub tts_service_url: String,
    /// Tessdata directory for the tesseract engine, when compiled in.
    pub tessdata_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            gemini_api_key: non_empty_env("GEMINI_API_KEY"),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
            database_url: non_empty_env("DATABASE_URL"),
            tts_service_url: std::env::var("TTS_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:5001".to_string()),
            tessdata_dir: non_empty_env("TESSDATA_DIR").map(PathBuf::from),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
