use medscan_service::{ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServiceConfig::from_env();

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set, analyses will return canned unavailable records");
    }

    let port = config.port;
    let app = create_app(config).await;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    let addr = listener.local_addr()?;

    info!("MedScan analysis service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Prescription endpoint: POST http://{}/api/prescriptions/analyze", addr);
    info!("Report endpoint: POST http://{}/api/reports/analyze", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
