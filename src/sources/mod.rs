//! Frame source implementations
//!
//! - [`SyntheticSource`] for `stub://` urls (tests, demos)
//! - [`StillImageSource`] for image files

mod encode;
mod still;
mod synthetic;

pub use encode::{DATA_URL_PREFIX, FrameEncoder};
pub use still::StillImageSource;
pub use synthetic::SyntheticSource;

use crate::source::FrameSource;

/// Scheme selecting the synthetic test pattern
pub const STUB_SCHEME: &str = "stub://";

/// Pick a source for a command-line style locator
///
/// `stub://...` yields the synthetic pattern, anything else is read as an image path.
pub fn open_source(locator: &str, encoder: FrameEncoder) -> Box<dyn FrameSource> {
    if locator.starts_with(STUB_SCHEME) {
        Box::new(SyntheticSource::new(locator, encoder))
    } else {
        Box::new(StillImageSource::new(locator, encoder))
    }
}
