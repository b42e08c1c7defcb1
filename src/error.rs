//! Error types for the streaming session.
//!
//! All errors implement `std::error::Error` and carry enough context to be shown
//! to a user or logged without further decoration.
//!
//! ## Error Categories
//!
//! - **Device Errors**: the frame source (camera, still image) cannot be acquired
//! - **Transport Errors**: connection-level faults on the duplex socket
//! - **Protocol Errors**: inbound messages that cannot be decoded
//! - **Remote Rejections**: `error` messages sent by the inference service
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Only [`StreamError::DeviceUnavailable`] aborts a session start. Everything
//! else is absorbed by the session manager and surfaced as a
//! [`SessionEvent`](crate::SessionEvent).
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use comsigns_live::StreamError;
//!
//! let error = StreamError::transport_failed("connection reset by peer");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for the streaming client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Frame source '{device}' unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Malformed inbound message: {details}")]
    ProtocolDecode { details: String },

    #[error("Inference service rejected the request: {message}")]
    RemoteRejection { message: String },

    #[error("Frame encoding failed: {details}")]
    Encode { details: String },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session {channel} channel closed")]
    ChannelClosed { channel: &'static str },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Transport { .. } => true,
            StreamError::RemoteRejection { .. } => true,
            StreamError::ProtocolDecode { .. } => true,
            StreamError::Encode { .. } => true,
            StreamError::DeviceUnavailable { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::File { .. } => false,
            StreamError::ChannelClosed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::DeviceUnavailable { .. } => vec![
                "Check that a camera is connected",
                "Grant camera permission to this application",
                "Close other applications holding the camera",
            ],
            StreamError::Transport { .. } => vec![
                "Check network connectivity",
                "Verify the inference endpoint URL",
                "Wait for automatic reconnection",
            ],
            StreamError::ProtocolDecode { .. } => vec![
                "Check client and service protocol versions",
                "Inspect service logs for malformed output",
            ],
            StreamError::RemoteRejection { .. } => vec![
                "Read the message returned by the service",
                "Reset the session if the service lost sequence state",
            ],
            StreamError::Encode { .. } => vec![
                "Check the configured frame dimensions",
                "Check the configured JPEG quality",
            ],
            StreamError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Check COMSIGNS_API_URL and COMSIGNS_WS_URL",
                "Compare values against the documented defaults",
            ],
            StreamError::File { .. } => {
                vec!["Check file exists and is readable", "Check file permissions"]
            }
            StreamError::ChannelClosed { .. } => {
                vec!["Create a new session", "Check logs for a session task failure"]
            }
        }
    }

    /// Helper constructor for frame source acquisition failures.
    pub fn device_unavailable(device: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamError::DeviceUnavailable { device: device.into(), reason: reason.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        StreamError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for inbound decode failures.
    pub fn protocol_decode(details: impl Into<String>) -> Self {
        StreamError::ProtocolDecode { details: details.into() }
    }

    /// Helper constructor for service-side rejections.
    pub fn remote_rejection(message: impl Into<String>) -> Self {
        StreamError::RemoteRejection { message: message.into() }
    }

    /// Helper constructor for frame encoding failures.
    pub fn encode_failed(details: impl Into<String>) -> Self {
        StreamError::Encode { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::File { path, source }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            device in "\\w+",
            message in ".*",
            details in ".*"
          ) {
            let device_msg = StreamError::device_unavailable(device.clone(), reason.clone()).to_string();
            prop_assert!(device_msg.contains(&device));
            prop_assert!(device_msg.contains(&reason));

            let transport_msg = StreamError::transport_failed(reason.clone()).to_string();
            prop_assert!(transport_msg.contains(&reason));

            let rejection_msg = StreamError::remote_rejection(message.clone()).to_string();
            prop_assert!(rejection_msg.contains(&message));

            let decode_msg = StreamError::protocol_decode(details.clone()).to_string();
            prop_assert!(decode_msg.contains(&details));
          }

          #[test]
          fn transport_source_chain_is_preserved(base_message in ".+") {
            let inner: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));
            let error = StreamError::transport_failed_with_source("connect", inner);

            let source = std::error::Error::source(&error);
            prop_assert!(source.is_some());
            prop_assert_eq!(source.map(|s| s.to_string()), Some(base_message));
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<StreamError>();

        let error = StreamError::transport_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn only_device_and_setup_errors_are_fatal() {
        assert!(!StreamError::device_unavailable("camera", "permission denied").is_retryable());
        assert!(!StreamError::config_error("capture_fps", "must be positive").is_retryable());
        assert!(StreamError::transport_failed("reset").is_retryable());
        assert!(StreamError::remote_rejection("bad frame").is_retryable());
        assert!(StreamError::protocol_decode("not json").is_retryable());
    }

    #[test]
    fn recovery_suggestions_are_descriptive() {
        let errors = [
            StreamError::device_unavailable("camera", "busy"),
            StreamError::transport_failed("reset"),
            StreamError::protocol_decode("eof"),
            StreamError::remote_rejection("no model"),
            StreamError::encode_failed("zero width"),
            StreamError::config_error("yaml", "bad indent"),
            StreamError::ChannelClosed { channel: "command" },
        ];

        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "no suggestions for {error}");
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn io_errors_convert_to_file_errors() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.png");
        let error: StreamError = io_err.into();

        match error {
            StreamError::File { source, .. } => assert_eq!(source.to_string(), "missing.png"),
            _ => panic!("Expected File error variant"),
        }
    }
}
