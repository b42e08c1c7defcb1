//! Capture rate control for the frame-pacing loop

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Result, StreamError};

/// Fixed capture rate for the pacing timer, in frames per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CaptureRate(u32);

impl CaptureRate {
    /// Rate used by the live camera view
    pub const DEFAULT_FPS: u32 = 10;

    /// Create a capture rate; zero is rejected
    pub fn new(fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(StreamError::config_error("capture_fps", "must be at least 1"));
        }
        Ok(Self(fps))
    }

    /// Frames per second
    pub fn fps(self) -> u32 {
        self.0
    }

    /// Period between two captures
    pub fn interval(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.0 as f64)
    }
}

impl Default for CaptureRate {
    fn default() -> Self {
        Self(Self::DEFAULT_FPS)
    }
}

impl TryFrom<u32> for CaptureRate {
    type Error = StreamError;

    fn try_from(fps: u32) -> Result<Self> {
        Self::new(fps)
    }
}

impl From<CaptureRate> for u32 {
    fn from(rate: CaptureRate) -> Self {
        rate.0
    }
}
