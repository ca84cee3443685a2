//! Vision OCR Gateway - reshapes cloud OCR results behind a single JSON endpoint.

mod config;
mod error;
mod ocr;
mod schema;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use config::AppConfig;
use error::ApiError;
use ocr::azure::AzureVisionProvider;
use ocr::{AnalysisError, OcrProvider, VisualFeature};
use schema::AnalyzeResponse;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers. Read-only after startup.
#[derive(Clone)]
struct AppState {
    provider: Arc<dyn OcrProvider>,
    timeout: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "vision_ocr_gateway=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Refuse to start without credentials
    let config = AppConfig::from_env()
        .context("Set VISION_ENDPOINT and VISION_KEY before starting the server")?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let provider = AzureVisionProvider::new(client, &config.vision);
    info!(
        "Vision provider '{}' initialized (endpoint={}, api-version={}, timeout={:?})",
        provider.name(),
        config.vision.endpoint,
        config.vision.api_version,
        config.vision.timeout
    );

    let state = AppState {
        provider: Arc::new(provider),
        timeout: config.vision.timeout,
    };

    let app = build_router(state, config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!("Server listening on http://{}", config.server.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze_image", post(analyze_image))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Run OCR on a base64-encoded image and return its lines and words.
async fn analyze_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    run_analysis(&state, &body)
        .instrument(info_span!("analyze_image", %request_id))
        .await
}

async fn run_analysis(state: &AppState, body: &[u8]) -> Result<Json<AnalyzeResponse>, ApiError> {
    let image = decode_image(body)?;
    info!("Received image ({} bytes)", image.len());

    let result = tokio::time::timeout(
        state.timeout,
        state.provider.analyze(&image, &[VisualFeature::Read]),
    )
    .await
    .map_err(|_| AnalysisError::Timeout(state.timeout))??;

    let response = AnalyzeResponse::from(&result);
    info!(
        "OCR complete: {} lines (model={}, {}x{})",
        response.ocr_results.text_lines.len(),
        response.model_version,
        response.image_width,
        response.image_height
    );
    Ok(Json(response))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Pull the `image` field out of a JSON body and base64-decode it.
fn decode_image(body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ApiError::MissingImage)?;

    let encoded = match value.get("image") {
        None | Some(serde_json::Value::Null) => return Err(ApiError::MissingImage),
        Some(image) => image.as_str().ok_or_else(|| {
            ApiError::InvalidImage("Field 'image' must be a base64-encoded string".to_string())
        })?,
    };

    // Wrapped base64 (e.g. 76-column MIME output) is accepted
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| ApiError::InvalidImage(format!("Field 'image' is not valid base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(ApiError::InvalidImage("Field 'image' is empty".to_string()));
    }

    Ok(bytes)
}
