use axum::extract::{multipart::MultipartError, Multipart};
use tracing::{debug, warn};

use crate::{compress::UploadedImage, data_url};

pub const IMAGE_FIELD: &str = "image";
pub const MAX_SIZE_FIELD: &str = "maxSizeMB";

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Fields the upload and compression endpoints understand.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<UploadedImage>,
    pub max_size_mb: Option<String>,
}

pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(IMAGE_FIELD) if form.image.is_none() => {
                let declared = field
                    .content_type()
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned);
                let bytes = field.bytes().await?.to_vec();
                let media_type = declared.unwrap_or_else(|| sniff_media_type(&bytes).to_string());
                debug!("Got image part: {}, {} bytes", media_type, bytes.len());
                form.image = Some(UploadedImage::new(bytes, media_type));
            }
            Some(MAX_SIZE_FIELD) => {
                form.max_size_mb = Some(field.text().await?);
            }
            other => {
                warn!("Ignoring part {:?}", other);
            }
        }
    }

    Ok(form)
}

/// Media type inferred from the leading bytes, for parts sent without a content type.
pub fn sniff_media_type(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_MEDIA_TYPE)
}

/// The upload relay's whole job: bytes in, self-contained data URL out.
pub fn to_data_url(upload: &UploadedImage) -> String {
    data_url::encode(&upload.media_type, &upload.bytes)
}
