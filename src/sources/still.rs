//! Still image source for hosts without a camera

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

use super::FrameEncoder;
use crate::source::FrameSource;
use crate::{Result, StreamError};

/// Replays one image file as a live feed
///
/// The file is decoded and encoded once on `acquire()`; every capture hands out
/// the same payload.
pub struct StillImageSource {
    path: PathBuf,
    encoder: FrameEncoder,
    payload: Option<Arc<str>>,
}

impl StillImageSource {
    /// Create a source reading `path` on acquire
    pub fn new<P: AsRef<Path>>(path: P, encoder: FrameEncoder) -> Self {
        Self { path: path.as_ref().to_path_buf(), encoder, payload: None }
    }
}

#[async_trait::async_trait]
impl FrameSource for StillImageSource {
    async fn acquire(&mut self) -> Result<()> {
        let path = self.path.clone();
        let encoder = self.encoder;
        let (payload, width, height) = task::spawn_blocking(move || {
            let image = image::open(&path).map_err(|e| {
                StreamError::device_unavailable(path.display().to_string(), e.to_string())
            })?;
            let payload = encoder.encode(&image)?;
            Ok::<_, StreamError>((payload, image.width(), image.height()))
        })
        .await
        .map_err(|e| StreamError::device_unavailable(self.describe(), e.to_string()))??;

        info!(
            "Still image acquired: {} ({}x{}, {} bytes encoded)",
            self.path.display(),
            width,
            height,
            payload.len()
        );

        self.payload = Some(payload);
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Arc<str>> {
        self.payload
            .clone()
            .ok_or_else(|| StreamError::device_unavailable(self.describe(), "capture before acquire"))
    }

    async fn release(&mut self) {
        if self.payload.take().is_some() {
            debug!("Still image released: {}", self.path.display());
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[tokio::test]
    async fn missing_file_is_device_unavailable() {
        let encoder = FrameEncoder::new(32, 24, 80).unwrap();
        let mut source = StillImageSource::new("/nonexistent/frame.png", encoder);

        let err = source.acquire().await.unwrap_err();
        assert!(matches!(err, StreamError::DeviceUnavailable { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn replays_the_same_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hand.png");
        RgbImage::from_pixel(80, 60, Rgb([200, 150, 120])).save(&path).unwrap();

        let encoder = FrameEncoder::new(32, 24, 80).unwrap();
        let mut source = StillImageSource::new(&path, encoder);
        source.acquire().await.unwrap();

        let first = source.capture_frame().await.unwrap();
        let second = source.capture_frame().await.unwrap();
        assert_eq!(first, second);

        source.release().await;
        source.release().await;
        assert!(source.capture_frame().await.is_err());
    }
}
