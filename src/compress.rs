use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ColorType, DynamicImage, GenericImageView};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data_url;

pub const MAX_WIDTH: u32 = 1200;
pub const INITIAL_QUALITY: f32 = 0.7;
pub const QUALITY_FACTOR: f32 = 0.7;
pub const MAX_ATTEMPTS: u32 = 3;
/// Share of the ceiling an attempt must fit under to stop early.
pub const TARGET_RATIO: f64 = 0.9;
pub const OUTPUT_MEDIA_TYPE: &str = "image/jpeg";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const LARGE_INPUT_MB: f64 = 20.0;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("Please upload an image file.")]
    InvalidInput { media_type: String },
    #[error("Failed to process the image: {0}")]
    Io(#[from] image::ImageError),
    #[error("Image is too large ({size_mb:.1}MB). Please try a smaller image or reduce its quality before uploading.")]
    TooLarge { size_mb: f64, max_size_mb: f64 },
}

/// A user supplied file as received: bytes plus the declared media type.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        UploadedImage {
            bytes,
            media_type: media_type.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub quality: f32,
    pub attempts: u32,
    pub original_size: usize,
    pub max_size_mb: f64,
}

impl CompressedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn size_mb(&self) -> f64 {
        self.size() as f64 / BYTES_PER_MB
    }

    pub fn fits(&self) -> bool {
        self.size_mb() <= self.max_size_mb
    }

    /// Data URL of the re-encoded bytes, directly usable as an image source.
    pub fn preview_url(&self) -> String {
        data_url::encode(OUTPUT_MEDIA_TYPE, &self.bytes)
    }
}

/// Re-encodes `upload` as JPEG so that it fits under `max_size_mb`.
///
/// Fails with [`CompressError::TooLarge`] when the last attempt is still over the ceiling.
pub fn compress_image(
    upload: &UploadedImage,
    max_size_mb: f64,
) -> Result<CompressedImage, CompressError> {
    let compressed = compress_best_effort(upload, max_size_mb)?;

    if !compressed.fits() {
        warn!(
            "Compressed image is still {:.2}MB, which exceeds the {}MB limit",
            compressed.size_mb(),
            max_size_mb
        );
        return Err(CompressError::TooLarge {
            size_mb: compressed.size_mb(),
            max_size_mb,
        });
    }

    Ok(compressed)
}

/// Runs the bounded quality back-off and returns whatever the last attempt produced,
/// without checking it against the ceiling.
pub fn compress_best_effort(
    upload: &UploadedImage,
    max_size_mb: f64,
) -> Result<CompressedImage, CompressError> {
    if !upload.is_image() {
        return Err(CompressError::InvalidInput {
            media_type: upload.media_type.clone(),
        });
    }

    let original_mb = upload.size() as f64 / BYTES_PER_MB;
    debug!("Original file size: {:.2}MB", original_mb);
    if original_mb > LARGE_INPUT_MB {
        warn!(
            "Very large image detected ({:.2}MB). Compression may take longer.",
            original_mb
        );
    }

    let image = fit_width(image::load_from_memory(&upload.bytes)?, MAX_WIDTH);
    let budget = max_size_mb * TARGET_RATIO * BYTES_PER_MB;

    let mut quality = INITIAL_QUALITY;
    let mut attempt = 1;
    let bytes = loop {
        let (bytes, within_budget) = encode_attempt(&image, quality, attempt, budget)?;
        if within_budget || attempt >= MAX_ATTEMPTS {
            break bytes;
        }
        quality *= QUALITY_FACTOR;
        attempt += 1;
    };

    let compressed = CompressedImage {
        bytes,
        quality,
        attempts: attempt,
        original_size: upload.size(),
        max_size_mb,
    };
    info!(
        "Original size: {:.2}MB, Compressed size: {:.2}MB, Compression ratio: {:.1}%",
        original_mb,
        compressed.size_mb(),
        compressed.size() as f64 / upload.size().max(1) as f64 * 100.0
    );

    Ok(compressed)
}

/// One JPEG encoding pass. Returns the bytes and whether they fit `budget` bytes.
pub fn encode_attempt(
    image: &DynamicImage,
    quality: f32,
    attempt: u32,
    budget: f64,
) -> Result<(Vec<u8>, bool), image::ImageError> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality)).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;

    debug!(
        "Compression attempt {}, quality: {:.2}, size: {:.2}MB",
        attempt,
        quality,
        bytes.len() as f64 / BYTES_PER_MB
    );

    let within_budget = bytes.len() as f64 <= budget;
    Ok((bytes, within_budget))
}

/// Scales `image` down to `max_width`, keeping the aspect ratio. Narrower images are untouched.
pub fn fit_width(image: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width {
        return image;
    }

    let ratio = max_width as f64 / width as f64;
    let new_height = ((height as f64 * ratio).round() as u32).max(1);
    image.resize_exact(max_width, new_height, FilterType::Lanczos3)
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageOutputFormat, Rgb, RgbImage};

    use super::*;

    fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let mut seed: u32 = 0x2545_f491;
        let img = RgbImage::from_fn(width, height, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [r, g, b, _] = seed.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn rejects_non_image_media_types() {
        let upload = UploadedImage::new(b"%PDF-1.4".to_vec(), "application/pdf");
        let err = compress_image(&upload, 5.0).unwrap_err();
        assert!(matches!(err, CompressError::InvalidInput { .. }));
        assert_eq!(err.to_string(), "Please upload an image file.");
    }

    #[test]
    fn undecodable_image_is_an_io_error() {
        let upload = UploadedImage::new(b"definitely not a png".to_vec(), "image/png");
        assert!(matches!(
            compress_image(&upload, 5.0),
            Err(CompressError::Io(_))
        ));
    }

    #[test]
    fn small_image_fits_on_first_attempt() {
        let upload = UploadedImage::new(gradient_png(64, 48), "image/png");
        let compressed = compress_image(&upload, 5.0).unwrap();

        assert_eq!(compressed.attempts, 1);
        assert_eq!(compressed.quality, INITIAL_QUALITY);
        assert!(compressed.fits());

        let decoded = image::load_from_memory(&compressed.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
        assert_eq!(
            image::guess_format(&compressed.bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn wide_image_is_downscaled_to_max_width() {
        let upload = UploadedImage::new(gradient_png(2400, 600), "image/png");
        let compressed = compress_image(&upload, 5.0).unwrap();

        let decoded = image::load_from_memory(&compressed.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (1200, 300));
    }

    #[test]
    fn gives_up_after_three_attempts() {
        let upload = UploadedImage::new(noisy_png(400, 300), "image/png");

        let best_effort = compress_best_effort(&upload, 0.001).unwrap();
        assert_eq!(best_effort.attempts, MAX_ATTEMPTS);
        assert!((best_effort.quality - 0.343).abs() < 1e-4);
        assert!(!best_effort.fits());

        match compress_image(&upload, 0.001) {
            Err(CompressError::TooLarge { size_mb, max_size_mb }) => {
                assert!(size_mb > max_size_mb);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }

    #[test]
    fn preview_is_a_jpeg_data_url() {
        let upload = UploadedImage::new(gradient_png(16, 16), "image/png");
        let compressed = compress_image(&upload, 1.0).unwrap();
        let preview = compressed.preview_url();

        assert!(preview.starts_with("data:image/jpeg;base64,"));
        let parsed = data_url::DataUrl::parse(&preview).unwrap();
        assert_eq!(parsed.decode().unwrap(), compressed.bytes);
    }

    #[test]
    fn encode_attempt_reports_budget() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([10, 20, 30])));
        let (bytes, fits) = encode_attempt(&image, 0.7, 1, 1_000_000.0).unwrap();
        assert!(fits);
        let (_, fits) = encode_attempt(&image, 0.7, 1, (bytes.len() - 1) as f64).unwrap();
        assert!(!fits);
    }

    #[test]
    fn maps_fractional_quality_to_jpeg_scale() {
        assert_eq!(jpeg_quality(0.7), 70);
        assert_eq!(jpeg_quality(0.49), 49);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(1.5), 100);
    }
}
