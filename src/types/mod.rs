//! Core types shared by the session manager and its observers.
//!
//! - [`Frame`] is one encoded still image on its way to the service
//! - [`CaptureRate`] drives the frame-pacing timer
//! - [`Prediction`] is the latest payload returned by the service
//! - [`SessionSnapshot`] and [`SessionEvent`] form the observer surface
//!
//! ## Usage Example
//!
//! ```rust
//! use comsigns_live::types::{CaptureRate, ConnectionState, SessionSnapshot};
//! use std::time::Duration;
//!
//! let rate = CaptureRate::new(10).unwrap();
//! assert_eq!(rate.interval(), Duration::from_millis(100));
//!
//! let snapshot = SessionSnapshot::default();
//! assert_eq!(snapshot.state, ConnectionState::Disconnected);
//! assert!(!snapshot.active);
//! ```

mod capture_rate;
mod frame;
mod prediction;
mod session;

pub use capture_rate::CaptureRate;
pub use frame::Frame;
pub use prediction::Prediction;
pub use session::{ConnectionState, ErrorKind, SessionEvent, SessionSnapshot};
