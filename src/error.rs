use std::{error::Error as _, time::Duration};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::compress::CompressError;

pub const UNAVAILABLE_MESSAGE: &str =
    "The car recognition server is temporarily unavailable. Please try again later.";
pub const TIMEOUT_MESSAGE: &str = "The request took too long to complete. Please try with a smaller image or check your internet connection.";

/// Every failure a relay endpoint can report. None of them is retried.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    MissingInput(&'static str),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Server configuration error: Car recognition API URL not configured")]
    Configuration,
    #[error("Request to car recognition API timed out after {} seconds", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },
    #[error("{0}")]
    Processing(String),
    #[error("Failed to process the image. Please try a different one.")]
    Image(#[source] image::ImageError),
}

impl RelayError {
    /// Non-success HTTP answer from the classifier, keeping its body text when there is one.
    pub fn upstream_status(status: u16, body: &str) -> Self {
        let mut message = format!("API responded with status: {}", status);
        if !body.is_empty() {
            message.push_str(" - ");
            message.push_str(body);
        }
        RelayError::Upstream {
            status: Some(status),
            message,
        }
    }

    /// The classifier answered over HTTP but reported something other than `success`.
    pub fn upstream_rejected(body: &str) -> Self {
        RelayError::Upstream {
            status: None,
            message: format!("Car recognition API returned an error: {}", body),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_) | RelayError::MissingInput(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Configuration
            | RelayError::Timeout(_)
            | RelayError::Upstream { .. }
            | RelayError::Processing(_)
            | RelayError::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the user. Gateway failures and timeouts get a friendlier
    /// wording; validation and configuration errors are reported as they are.
    pub fn user_message(&self) -> String {
        match self {
            RelayError::Timeout(_) => TIMEOUT_MESSAGE.to_string(),
            RelayError::Upstream { .. } | RelayError::Processing(_) => {
                shape_message(self.to_string())
            }
            _ => self.to_string(),
        }
    }
}

fn shape_message(message: String) -> String {
    let lower = message.to_lowercase();
    if message.contains("502") || message.contains("504") {
        UNAVAILABLE_MESSAGE.to_string()
    } else if lower.contains("timeout") || lower.contains("timed out") {
        TIMEOUT_MESSAGE.to_string()
    } else {
        message
    }
}

impl From<CompressError> for RelayError {
    fn from(err: CompressError) -> Self {
        match err {
            CompressError::InvalidInput { .. } => RelayError::InvalidInput(err.to_string()),
            CompressError::TooLarge { .. } => RelayError::PayloadTooLarge(err.to_string()),
            CompressError::Io(source) => RelayError::Image(source),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self.source() {
            Some(source) => error!("{} ({}): {}", self, status, source),
            None => error!("{} ({})", self, status),
        }

        let body = Json(json!({ "success": false, "error": self.user_message() }));
        (status, body).into_response()
    }
}
