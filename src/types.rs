use serde::{Deserialize, Serialize};

use crate::model::Car;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn ok(image_url: String) -> Self {
        UploadResponse {
            success: true,
            image_url: Some(image_url),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionRequest {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionData {
    pub cars: Vec<Car>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RecognitionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecognitionResponse {
    pub fn ok(cars: Vec<Car>) -> Self {
        RecognitionResponse {
            success: true,
            data: Some(RecognitionData { cars }),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResponse {
    pub success: bool,
    pub image_url: String,
    pub original_size: usize,
    pub compressed_size: usize,
    pub quality: f32,
    pub attempts: u32,
}
