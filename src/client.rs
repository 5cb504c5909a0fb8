use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
    compress::{compress_image, CompressError, UploadedImage, OUTPUT_MEDIA_TYPE},
    model::Car,
    types::{RecognitionRequest, RecognitionResponse, UploadResponse},
    upload::IMAGE_FIELD,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Compress(#[from] CompressError),
    #[error("Failed to reach car recognition service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Server error: {0}")]
    Status(reqwest::StatusCode),
    #[error("{0}")]
    Service(String),
}

/// Outcome of a full intake: the uploaded image reference plus its cars.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub image_url: String,
    pub cars: Vec<Car>,
}

/// Talks to a running car recognition service over HTTP.
#[derive(Debug, Clone)]
pub struct CarRecognitionClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CarRecognitionClient {
    /// `base_url` is the service root, e.g. `http://localhost:5030/`.
    pub fn new(base_url: Url) -> Self {
        CarRecognitionClient {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        file_name: &str,
    ) -> Result<UploadResponse, ClientError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(media_type)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let response = self
            .http
            .post(self.endpoint("api/upload")?)
            .multipart(form)
            .send()
            .await?;
        read_envelope(response).await
    }

    pub async fn recognize_car(&self, image_url: &str) -> Result<RecognitionResponse, ClientError> {
        let request = RecognitionRequest {
            image_url: Some(image_url.to_string()),
        };

        let response = self
            .http
            .post(self.endpoint("api/recognize")?)
            .json(&request)
            .send()
            .await?;
        read_envelope(response).await
    }

    /// Compresses the file locally, uploads it and asks for its cars.
    /// Nothing is retried; the first failure is returned.
    pub async fn recognize_file(
        &self,
        upload: &UploadedImage,
        file_name: &str,
        max_size_mb: f64,
    ) -> Result<Recognition, ClientError> {
        info!(
            "Uploading image: {} {} {} bytes",
            file_name,
            upload.media_type,
            upload.size()
        );
        let compressed = compress_image(upload, max_size_mb)?;

        let uploaded = self
            .upload_image(compressed.bytes, OUTPUT_MEDIA_TYPE, file_name)
            .await?;
        let image_url = match uploaded {
            UploadResponse {
                success: true,
                image_url: Some(image_url),
                ..
            } => image_url,
            other => return Err(service_error(other.error, "Failed to upload image")),
        };
        info!("Image uploaded successfully");

        let recognized = self.recognize_car(&image_url).await?;
        let cars = match recognized {
            RecognitionResponse {
                success: true,
                data: Some(data),
                ..
            } => data.cars,
            other => return Err(service_error(other.error, "Failed to recognize car")),
        };
        info!("Recognition successful, found {} cars", cars.len());

        Ok(Recognition { image_url, cars })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Service(format!("Invalid service URL: {}", e)))
    }
}

/// Decodes the `{ success, ... }` envelope. Error answers that are not JSON
/// are reported by status alone.
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str(&text) {
        Ok(envelope) => Ok(envelope),
        Err(_) if !status.is_success() => {
            error!("Response not OK: {} {}", status, text);
            Err(ClientError::Status(status))
        }
        Err(e) => Err(ClientError::Service(format!(
            "Unexpected response from service: {}",
            e
        ))),
    }
}

fn service_error(message: Option<String>, fallback: &str) -> ClientError {
    let message = message.unwrap_or_else(|| fallback.to_string());
    error!("Error in car recognition process: {}", message);
    ClientError::Service(message)
}
