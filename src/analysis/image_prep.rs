//! Image downscaling and JPEG re-encoding ahead of the vision call.
//!
//! Phone photos are routinely 4000px wide; the model does not need that
//! much detail and the request body has to carry the image as base64.

use std::io::Cursor;

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageDecoder, ImageReader};
use serde::Deserialize;
use tracing::debug;

use super::types::EncodedImage;
use crate::error::AnalysisError;

pub const DEFAULT_MAX_WIDTH: u32 = 1200;
pub const DEFAULT_QUALITY: f32 = 0.7;
pub const THUMBNAIL_MAX_WIDTH: u32 = 300;
pub const THUMBNAIL_QUALITY: f32 = 0.6;

pub const JPEG_MIME: &str = "image/jpeg";

/// Width cap and lossy quality factor (0.0 to 1.0, 1.0 = best).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EncodeOptions {
    pub max_width: u32,
    pub quality: f32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl EncodeOptions {
    pub fn new(max_width: u32, quality: f32) -> Self {
        Self { max_width, quality }
    }

    pub fn thumbnail() -> Self {
        Self {
            max_width: THUMBNAIL_MAX_WIDTH,
            quality: THUMBNAIL_QUALITY,
        }
    }

    /// Quality mapped onto the encoder's 1..=100 scale.
    fn jpeg_quality(&self) -> u8 {
        let q = if self.quality.is_finite() {
            self.quality.clamp(0.0, 1.0)
        } else {
            DEFAULT_QUALITY
        };
        ((q * 100.0).round() as u8).max(1)
    }
}

/// Turns raw upload bytes into a transport-safe image.
///
/// The server uses [`JpegPreprocessor`]; other contexts can plug their own
/// decoder without touching the analysis pipeline.
pub trait ImagePreprocessor: Send + Sync {
    fn encode(&self, image_bytes: &[u8], options: EncodeOptions)
        -> Result<EncodedImage, AnalysisError>;
}

/// Decodes any format the `image` crate understands and re-encodes as JPEG.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegPreprocessor;

impl ImagePreprocessor for JpegPreprocessor {
    fn encode(
        &self,
        image_bytes: &[u8],
        options: EncodeOptions,
    ) -> Result<EncodedImage, AnalysisError> {
        let img = decode(image_bytes)?;
        let (width, height) = (img.width(), img.height());

        let resized = downscale_to_width(img, options.max_width);
        let jpeg = encode_jpeg(&resized, options.jpeg_quality())?;

        debug!(
            src_width = width,
            src_height = height,
            width = resized.width(),
            height = resized.height(),
            bytes = jpeg.len(),
            "image re-encoded"
        );

        Ok(EncodedImage {
            bytes: Bytes::from(jpeg),
            width: resized.width(),
            height: resized.height(),
            mime_type: JPEG_MIME,
        })
    }
}

/// Output size for an image of `width` x `height` capped at `max_width`.
/// Height follows proportionally, rounded to the nearest pixel.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let max_width = max_width.max(1);
    if width <= max_width {
        return (width, height);
    }
    let scaled = (f64::from(height) * f64::from(max_width) / f64::from(width)).round() as u32;
    (max_width, scaled.max(1))
}

fn decode(image_bytes: &[u8]) -> Result<DynamicImage, AnalysisError> {
    let reader = ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(|e| AnalysisError::ImageDecode(e.to_string()))?;
    let mut decoder = reader.into_decoder()?;
    // Photos from phones are usually stored sideways with an EXIF hint.
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn downscale_to_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = target_dimensions(img.width(), img.height(), max_width);
    if width == img.width() && height == img.height() {
        return img;
    }
    img.resize_exact(width, height, FilterType::Triangle)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, AnalysisError> {
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;
    Ok(buffer)
}
