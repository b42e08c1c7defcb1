//! Frame source trait for image capture devices

use std::sync::Arc;

use crate::Result;

/// Trait for still-image producers feeding the pacing loop
///
/// Sources abstract over where pixels come from (camera, file, synthetic test
/// pattern) and hand back an encoded payload ready to put on the wire. The
/// session driver owns the source exclusively and calls it from its event loop.
#[async_trait::async_trait]
pub trait FrameSource: Send + 'static {
    /// Open the underlying device
    ///
    /// Returns `Err(StreamError::DeviceUnavailable)` when the device cannot be
    /// opened (missing, busy, permission denied). A failed acquire aborts the
    /// session start and is not retried.
    async fn acquire(&mut self) -> Result<()>;

    /// Encode the current live image
    ///
    /// Only called between a successful `acquire()` and `release()`. Reading
    /// the current frame of an acquired device is not expected to fail; an
    /// `Err` here is logged and the tick is skipped.
    async fn capture_frame(&mut self) -> Result<Arc<str>>;

    /// Free the device
    ///
    /// Idempotent: safe to call repeatedly and on a source that was never
    /// acquired.
    async fn release(&mut self);

    /// Human-readable device name for logs and errors
    fn describe(&self) -> String;
}

#[async_trait::async_trait]
impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    async fn acquire(&mut self) -> Result<()> {
        (**self).acquire().await
    }

    async fn capture_frame(&mut self) -> Result<Arc<str>> {
        (**self).capture_frame().await
    }

    async fn release(&mut self) {
        (**self).release().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
