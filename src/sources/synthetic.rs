//! Synthetic test-pattern source (`stub://` URLs)

use image::{DynamicImage, Rgb, RgbImage};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, trace};

use super::FrameEncoder;
use crate::source::FrameSource;
use crate::{Result, StreamError};

/// Moving gradient generator standing in for a camera
///
/// Always acquirable. Each capture shifts the pattern so consecutive frames
/// differ.
pub struct SyntheticSource {
    url: String,
    encoder: FrameEncoder,
    acquired: bool,
    frames_captured: u64,
}

impl SyntheticSource {
    /// Create a source for the given `stub://` url
    pub fn new(url: impl Into<String>, encoder: FrameEncoder) -> Self {
        Self { url: url.into(), encoder, acquired: false, frames_captured: 0 }
    }

    /// Frames produced since creation
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }
}

/// Gradient pattern shifted by `shift` pixels
fn render(width: u32, height: u32, shift: u32) -> DynamicImage {
    let pattern = RgbImage::from_fn(width, height, |x, y| {
        Rgb([((x + shift) % 256) as u8, ((y + shift) % 256) as u8, ((x + y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(pattern)
}

#[async_trait::async_trait]
impl FrameSource for SyntheticSource {
    async fn acquire(&mut self) -> Result<()> {
        info!("Synthetic source acquired: {}", self.url);
        self.acquired = true;
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Arc<str>> {
        if !self.acquired {
            return Err(StreamError::device_unavailable(&self.url, "capture before acquire"));
        }

        // Rendering and JPEG encoding are CPU-bound; keep them off the session task
        let encoder = self.encoder;
        let shift = (self.frames_captured % 256) as u32;
        let payload = task::spawn_blocking(move || {
            encoder.encode(&render(encoder.width(), encoder.height(), shift))
        })
        .await
        .map_err(|e| StreamError::encode_failed(format!("encoder task failed: {e}")))??;
        self.frames_captured += 1;
        trace!("Synthetic frame {} ({} bytes)", self.frames_captured, payload.len());
        Ok(payload)
    }

    async fn release(&mut self) {
        if self.acquired {
            debug!("Synthetic source released after {} frames", self.frames_captured);
        }
        self.acquired = false;
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SyntheticSource {
        SyntheticSource::new("stub://pattern", FrameEncoder::new(32, 24, 70).unwrap())
    }

    #[tokio::test]
    async fn capture_requires_acquire() {
        let mut source = source();
        assert!(matches!(
            source.capture_frame().await,
            Err(StreamError::DeviceUnavailable { .. })
        ));

        source.acquire().await.unwrap();
        let frame = source.capture_frame().await.unwrap();
        assert!(frame.starts_with(crate::sources::DATA_URL_PREFIX));
        assert_eq!(source.frames_captured(), 1);
    }

    #[tokio::test]
    async fn consecutive_frames_differ() {
        let mut source = source();
        source.acquire().await.unwrap();

        let first = source.capture_frame().await.unwrap();
        let second = source.capture_frame().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn capture_yields_while_encoding() {
        let mut source =
            SyntheticSource::new("stub://pattern", FrameEncoder::new(1280, 720, 90).unwrap());
        source.acquire().await.unwrap();

        let other_work_ran = tokio::select! {
            biased;
            _ = source.capture_frame() => false,
            _ = std::future::ready(()) => true,
        };
        assert!(other_work_ran);
        assert_eq!(source.frames_captured(), 0);

        assert!(source.capture_frame().await.is_ok());
        assert_eq!(source.frames_captured(), 1);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let mut source = source();
        source.release().await;
        source.acquire().await.unwrap();
        source.release().await;
        source.release().await;
        assert!(source.capture_frame().await.is_err());
    }
}
