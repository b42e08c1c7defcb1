//! Real-time camera streaming client for the ComSigns sign-language
//! inference service.
//!
//! A [`LiveSession`] acquires a frame source, paces captured frames at a fixed
//! rate onto a WebSocket connection, and surfaces the predictions the service
//! sends back. Dropped connections are re-established with capped exponential
//! backoff until the session is stopped.
//!
//! # Architecture
//!
//! - [`session::SessionMachine`]: pure state machine; every transition returns
//!   the effects to carry out
//! - [`driver::Driver`]: background task owning the source, transport and
//!   timers, executing those effects
//! - [`transport::Transport`] / [`source::FrameSource`]: seams for the network
//!   and the camera
//! - [`protocol`]: JSON wire messages
//!
//! # Example
//!
//! ```rust,no_run
//! use comsigns_live::sources::{FrameEncoder, open_source};
//! use comsigns_live::{LiveSession, SessionEvent, StreamConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamConfig::default().apply_env()?;
//!     let source = open_source("stub://pattern", FrameEncoder::from_config(&config)?);
//!     let session = LiveSession::connect(&config, source)?;
//!
//!     let mut events = Box::pin(session.events());
//!     session.start()?;
//!
//!     while let Some(event) = events.next().await {
//!         if let SessionEvent::Prediction(prediction) = event {
//!             println!("{:?} ({}%)", prediction.gloss(), prediction.confidence_percent());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Wire protocol and session logic
pub mod driver;
pub mod live;
pub mod protocol;
pub mod session;

// Frame sources and network transport
pub mod source;
pub mod sources;
pub mod transport;

// Core exports
pub use config::StreamConfig;
pub use error::*;
pub use live::LiveSession;
pub use source::FrameSource;
pub use types::*;
