//! JPEG data-URL encoding for captured images

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::sync::Arc;

use crate::config::StreamConfig;
use crate::{Result, StreamError};

/// Prefix of every encoded frame payload
pub const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Largest buffer reserved up front for one JPEG
const MAX_CAPACITY_HINT: usize = 4 * 1024 * 1024;

/// Encodes images at a fixed resolution and quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    width: u32,
    height: u32,
    quality: u8,
}

impl FrameEncoder {
    /// Create an encoder; zero dimensions and quality outside 1..=100 are rejected
    pub fn new(width: u32, height: u32, quality: u8) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(StreamError::encode_failed(format!(
                "invalid frame size {width}x{height}"
            )));
        }
        if !(1..=100).contains(&quality) {
            return Err(StreamError::encode_failed(format!("invalid JPEG quality {quality}")));
        }
        Ok(Self { width, height, quality })
    }

    /// Encoder matching the configured capture settings
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Self::new(config.frame_width, config.frame_height, config.jpeg_quality)
    }

    /// Output width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Scale `image` to the output size and encode it as a JPEG data URL
    pub fn encode(&self, image: &DynamicImage) -> Result<Arc<str>> {
        let rgb = if image.width() == self.width && image.height() == self.height {
            image.to_rgb8()
        } else {
            image.resize_exact(self.width, self.height, FilterType::Triangle).to_rgb8()
        };

        let mut jpeg = Vec::with_capacity(self.capacity_hint());
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&rgb)
            .map_err(|e| StreamError::encode_failed(e.to_string()))?;

        let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        url.push_str(DATA_URL_PREFIX);
        STANDARD.encode_string(&jpeg, &mut url);
        Ok(url.into())
    }

    /// Expected JPEG size, roughly one byte per eight pixels
    fn capacity_hint(&self) -> usize {
        let pixels = (self.width as usize).saturating_mul(self.height as usize);
        (pixels / 8).min(MAX_CAPACITY_HINT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn decode(url: &str) -> DynamicImage {
        let body = url.strip_prefix(DATA_URL_PREFIX).expect("data URL prefix");
        let bytes = STANDARD.decode(body).expect("valid base64");
        image::load_from_memory(&bytes).expect("valid JPEG")
    }

    #[test]
    fn encodes_data_url_at_output_size() {
        let encoder = FrameEncoder::new(64, 48, 80).unwrap();
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([10, 200, 30])));

        let url = encoder.encode(&source).unwrap();
        let decoded = decode(&url);

        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(FrameEncoder::new(0, 480, 80).is_err());
        assert!(FrameEncoder::new(640, 480, 0).is_err());
        assert!(FrameEncoder::new(640, 480, 101).is_err());
    }

    #[test]
    fn capacity_hint_handles_large_frames() {
        assert_eq!(FrameEncoder::new(640, 480, 80).unwrap().capacity_hint(), 38_400);

        // 70000 * 70000 overflows u32
        let huge = FrameEncoder::new(70_000, 70_000, 80).unwrap();
        assert_eq!(huge.capacity_hint(), MAX_CAPACITY_HINT);
    }
}
