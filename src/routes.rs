use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

use crate::{
    compress::compress_image,
    config::Config,
    error::RelayError,
    relay::RecognitionRelay,
    types::{CompressResponse, RecognitionRequest, RecognitionResponse, UploadResponse},
    upload::{read_upload_form, to_data_url},
};

pub struct AppState {
    pub relay: RecognitionRelay,
    pub max_upload_size_mb: f64,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        AppState {
            relay: RecognitionRelay::from_config(config),
            max_upload_size_mb: config.max_upload_size_mb,
        }
    }
}

pub fn router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/recognize", post(recognize_handler))
        .route("/api/compress", post(compress_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
        .route("/health", get(health_check))
}

async fn upload_handler(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, RelayError> {
    let form = read_upload_form(multipart.map_err(not_multipart)?)
        .await
        .map_err(upload_failed)?;
    let image = form
        .image
        .ok_or(RelayError::MissingInput("No image provided"))?;

    info!("Uploaded image: {}, {} bytes", image.media_type, image.size());
    Ok(Json(UploadResponse::ok(to_data_url(&image))))
}

async fn recognize_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecognitionRequest>, JsonRejection>,
) -> Result<Json<RecognitionResponse>, RelayError> {
    state.relay.ensure_configured()?;

    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::PayloadTooLarge(rejection.body_text())
        } else {
            RelayError::InvalidInput(rejection.body_text())
        }
    })?;
    let image_url = request
        .image_url
        .filter(|url| !url.is_empty())
        .ok_or(RelayError::MissingInput("No image URL provided"))?;

    let cars = state.relay.recognize(&image_url).await?;
    Ok(Json(RecognitionResponse::ok(cars)))
}

async fn compress_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CompressResponse>, RelayError> {
    let form = read_upload_form(multipart.map_err(not_multipart)?)
        .await
        .map_err(upload_failed)?;
    let image = form
        .image
        .ok_or(RelayError::MissingInput("No image provided"))?;
    let max_size_mb = match form.max_size_mb {
        Some(raw) => parse_max_size(&raw)?,
        None => state.max_upload_size_mb,
    };

    let compressed = tokio::task::spawn_blocking(move || compress_image(&image, max_size_mb))
        .await
        .map_err(|e| RelayError::Processing(format!("Compression task failed: {}", e)))??;

    Ok(Json(CompressResponse {
        success: true,
        image_url: compressed.preview_url(),
        original_size: compressed.original_size,
        compressed_size: compressed.size(),
        quality: compressed.quality,
        attempts: compressed.attempts,
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

fn not_multipart(rejection: MultipartRejection) -> RelayError {
    error!("Error processing upload: {}", rejection.body_text());
    RelayError::Processing("Failed to process upload".to_string())
}

fn upload_failed(err: MultipartError) -> RelayError {
    error!("Error processing upload: {}", err);
    RelayError::Processing("Failed to process upload".to_string())
}

fn parse_max_size(raw: &str) -> Result<f64, RelayError> {
    match raw.trim().parse::<f64>() {
        Ok(mb) if mb > 0.0 && mb.is_finite() => Ok(mb),
        _ => Err(RelayError::InvalidInput(format!(
            "maxSizeMB must be a positive number, got {:?}",
            raw
        ))),
    }
}
