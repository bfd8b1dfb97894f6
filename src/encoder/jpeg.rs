//! JPEG preview encoding

use crate::capture::Frame;
use crate::config::PreviewSettings;
use crate::utils::error::{RecorderError, RecorderResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, RgbImage};

/// Encoded preview image
#[derive(Debug, Clone)]
pub struct EncodedPreview {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Compresses frames into small JPEGs for display, not archival
#[derive(Debug, Clone)]
pub struct PreviewEncoder {
    quality: u8,
    max_width: u32,
}

impl PreviewEncoder {
    pub fn new(quality: u8, max_width: u32) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            max_width,
        }
    }

    pub fn from_settings(settings: &PreviewSettings) -> Self {
        Self::new(settings.jpeg_quality, settings.max_width)
    }

    /// Preview size for a frame: scaled down to `max_width`, aspect preserved
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.max_width == 0 || width <= self.max_width {
            return (width, height);
        }
        let scaled_height = (height as u64 * self.max_width as u64 / width as u64).max(1);
        (self.max_width, scaled_height as u32)
    }

    pub fn encode(&self, frame: &Frame) -> RecorderResult<EncodedPreview> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| {
                RecorderError::Preview(format!(
                    "frame buffer of {} bytes does not hold {}x{} RGB",
                    frame.data.len(),
                    frame.width,
                    frame.height
                ))
            })?;

        let (width, height) = self.target_size(frame.width, frame.height);
        let image = if (width, height) != (frame.width, frame.height) {
            image::imageops::resize(&image, width, height, FilterType::Triangle)
        } else {
            image
        };

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| RecorderError::Preview(e.to_string()))?;

        Ok(EncodedPreview {
            jpeg,
            width,
            height,
        })
    }
}
