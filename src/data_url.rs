use base64::{
    alphabet,
    engine::{general_purpose, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use thiserror::Error;

/// Media type assumed when a data URL does not declare a usable one.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// Accepts payloads with or without `=` padding, as browsers produce both.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Error)]
pub enum DataUrlError {
    #[error("Image data URL has no payload")]
    MissingPayload,
    #[error("Data URL does not carry an image: {0}")]
    NotAnImage(String),
    #[error("Image data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encodes bytes as `data:<media type>;base64,<payload>`.
pub fn encode(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        media_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Borrowed view of a data URL, or of a bare base64 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUrl<'a> {
    media_type: Option<&'a str>,
    payload: &'a str,
}

impl<'a> DataUrl<'a> {
    /// Splits off the `data:...,` prefix when present. Input without the prefix is
    /// taken to be the base64 payload itself. A declared media type must be `image/*`;
    /// a missing or malformed one falls back to [`DEFAULT_MEDIA_TYPE`].
    pub fn parse(input: &'a str) -> Result<Self, DataUrlError> {
        let Some(rest) = input.strip_prefix("data:") else {
            return Ok(DataUrl {
                media_type: None,
                payload: input,
            });
        };

        let (header, payload) = rest.split_once(',').ok_or(DataUrlError::MissingPayload)?;
        let media_type = header.split(';').next().filter(|t| is_media_type(t));
        if let Some(declared) = media_type {
            if !declared.starts_with("image/") {
                return Err(DataUrlError::NotAnImage(declared.to_string()));
            }
        }

        Ok(DataUrl {
            media_type,
            payload,
        })
    }

    pub fn media_type(&self) -> &'a str {
        self.media_type.unwrap_or(DEFAULT_MEDIA_TYPE)
    }

    pub fn payload(&self) -> &'a str {
        self.payload
    }

    /// Decoded size estimate, computed from the payload length alone.
    pub fn estimated_size(&self) -> f64 {
        self.payload.len() as f64 * 0.75
    }

    /// Decodes the payload, skipping ASCII whitespace and tolerating missing padding.
    pub fn decode(&self) -> Result<Vec<u8>, DataUrlError> {
        let compact: Vec<u8> = self
            .payload
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        Ok(LENIENT.decode(compact)?)
    }
}

fn is_media_type(value: &str) -> bool {
    match value.split_once('/') {
        Some((kind, subtype)) => !kind.is_empty() && !subtype.is_empty() && !value.contains(' '),
        None => false,
    }
}
