use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::Config,
    data_url::{DataUrl, DataUrlError},
    error::RelayError,
    model::{cars_from_response, Car, ClassifierResponse},
};

/// Largest decoded image the relay forwards, in bytes.
pub const MAX_PAYLOAD_BYTES: f64 = 10.0 * 1024.0 * 1024.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const UPSTREAM_FILE_NAME: &str = "image.jpg";

/// Forwards a data URL to the external car classifier and normalizes its answer.
#[derive(Debug, Clone)]
pub struct RecognitionRelay {
    client: reqwest::Client,
    endpoint: Option<Url>,
    timeout: Duration,
}

impl RecognitionRelay {
    pub fn new(endpoint: Option<Url>, timeout: Duration) -> Self {
        RecognitionRelay {
            client: reqwest::Client::new(),
            endpoint,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.recognition_api_url.clone(), config.upstream_timeout)
    }

    pub fn ensure_configured(&self) -> Result<&Url, RelayError> {
        self.endpoint.as_ref().ok_or(RelayError::Configuration)
    }

    pub async fn recognize(&self, image_url: &str) -> Result<Vec<Car>, RelayError> {
        let endpoint = self.ensure_configured()?;
        if image_url.is_empty() {
            return Err(RelayError::MissingInput("No image URL provided"));
        }

        info!(
            "Sending request to car recognition API with image URL {}...",
            image_url.chars().take(50).collect::<String>()
        );

        let data_url = DataUrl::parse(image_url).map_err(|e| match e {
            DataUrlError::MissingPayload | DataUrlError::NotAnImage(_) => {
                RelayError::InvalidInput(e.to_string())
            }
            DataUrlError::Base64(_) => RelayError::Processing(e.to_string()),
        })?;

        let size_mb = data_url.estimated_size() / BYTES_PER_MB;
        info!("Image size (approx): {:.2} MB", size_mb);
        if data_url.estimated_size() > MAX_PAYLOAD_BYTES {
            warn!(
                "Image too large for processing: {:.2} MB, exceeding 10MB limit",
                size_mb
            );
            return Err(RelayError::PayloadTooLarge(
                "Image is too large. Please use an image smaller than 10MB or try the compression option."
                    .to_string(),
            ));
        }

        let bytes = data_url
            .decode()
            .map_err(|e| RelayError::Processing(e.to_string()))?;

        let response = self
            .classify(endpoint, bytes, data_url.media_type())
            .await?;
        let cars = cars_from_response(&response);
        info!("Recognition successful, found {} cars", cars.len());

        Ok(cars)
    }

    /// Single bounded POST to the classifier. Dropping the exchange on timeout
    /// aborts the in-flight request.
    async fn classify(
        &self,
        endpoint: &Url,
        bytes: Vec<u8>,
        media_type: &str,
    ) -> Result<ClassifierResponse, RelayError> {
        let part = Part::bytes(bytes)
            .file_name(UPSTREAM_FILE_NAME)
            .mime_str(media_type)
            .map_err(|e| RelayError::InvalidInput(format!("Unsupported media type: {}", e)))?;
        let form = Form::new().part("file", part);

        let exchange = async {
            let response = self
                .client
                .post(endpoint.clone())
                .multipart(form)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            info!("Car API response status: {}", status);

            let body = response.text().await.map_err(transport_error)?;
            if !status.is_success() {
                return Err(RelayError::upstream_status(status.as_u16(), &body));
            }
            debug!("Car API response: {}", body);

            let parsed: ClassifierResponse =
                serde_json::from_str(&body).map_err(|e| RelayError::Upstream {
                    status: Some(status.as_u16()),
                    message: format!("Car recognition API returned invalid JSON: {}", e),
                })?;
            if !parsed.is_success() {
                return Err(RelayError::upstream_rejected(&body));
            }

            Ok::<_, RelayError>(parsed)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(self.timeout)),
        }
    }
}

fn transport_error(err: reqwest::Error) -> RelayError {
    RelayError::Upstream {
        status: err.status().map(|s| s.as_u16()),
        message: format!("Failed to reach car recognition API: {}", err),
    }
}
