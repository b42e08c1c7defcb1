//! Wire codec for the realtime inference socket
//!
//! Every message is one JSON text frame with a `type` tag.
//!
//! Outbound:
//! - `{"type":"frame","data":{"frame":"data:image/jpeg;base64,...","timestamp":1700000000000,"sequence":0}}`
//! - `{"type":"control","action":"stop"}` / `{"type":"control","action":"reset"}`
//!
//! Inbound:
//! - `{"type":"status","status":"connected","session_id":"..."}`
//! - `{"type":"prediction","data":{...}}`
//! - `{"type":"error","error":"..."}`
//!
//! Inbound messages with any other `type` decode to `Ok(None)`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::types::{Frame, Prediction};
use crate::{Result, StreamError};

/// Status value announcing an established session
pub const STATUS_CONNECTED: &str = "connected";

/// Control actions understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Stop,
    Reset,
}

/// Frame body of an outbound `frame` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameData {
    pub frame: Arc<str>,
    pub timestamp: u64,
    pub sequence: u64,
}

impl From<&Frame> for FrameData {
    fn from(frame: &Frame) -> Self {
        Self {
            frame: Arc::clone(&frame.payload),
            timestamp: frame.timestamp_ms(),
            sequence: frame.sequence,
        }
    }
}

/// Client to service message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    Frame { data: FrameData },
    Control { action: ControlAction },
}

impl Outbound {
    /// Frame message for a captured frame
    pub fn frame(frame: &Frame) -> Self {
        Outbound::Frame { data: FrameData::from(frame) }
    }

    /// Control message
    pub fn control(action: ControlAction) -> Self {
        Outbound::Control { action }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Frame { .. } => "frame",
            Outbound::Control { action: ControlAction::Stop } => "control:stop",
            Outbound::Control { action: ControlAction::Reset } => "control:reset",
        }
    }
}

/// Service to client message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    Status {
        status: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    Prediction {
        data: Prediction,
    },
    Error {
        error: String,
    },
}

const INBOUND_TYPES: [&str; 3] = ["status", "prediction", "error"];

/// Serialize an outbound message into a text frame
pub fn encode_outbound(message: &Outbound) -> Result<String> {
    serde_json::to_string(message).map_err(|e| StreamError::encode_failed(e.to_string()))
}

/// Decode one inbound text frame
///
/// Returns:
/// - `Ok(Some(message))` - a recognised message
/// - `Ok(None)` - well-formed JSON with an unrecognised `type`
/// - `Err(ProtocolDecode)` - not JSON, no `type` tag, or a known type with a bad shape
pub fn decode_inbound(text: &str) -> Result<Option<Inbound>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| StreamError::protocol_decode(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StreamError::protocol_decode("missing string `type` tag"))?;

    if !INBOUND_TYPES.contains(&kind.as_str()) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| StreamError::protocol_decode(format!("{kind}: {e}")))
}
