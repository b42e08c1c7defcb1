//! Captured frame type for the send path

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One encoded still image taken from the frame source
///
/// Frames are immutable and owned by the send path. They are dropped right
/// after transmission, or immediately when the connection is not open.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the session's frame sequence
    pub sequence: u64,

    /// Encoded image (a `data:image/jpeg;base64,...` URL)
    pub payload: Arc<str>,

    /// Wall-clock capture time
    pub captured_at: SystemTime,
}

impl Frame {
    /// Create a new frame
    pub fn new(sequence: u64, payload: impl Into<Arc<str>>, captured_at: SystemTime) -> Self {
        Self { sequence, payload: payload.into(), captured_at }
    }

    /// Capture time as milliseconds since the Unix epoch
    pub fn timestamp_ms(&self) -> u64 {
        self.captured_at.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}
