//! Prediction payload returned by the inference service

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Latest prediction payload surfaced to observers
///
/// The payload is kept verbatim so fields added by the service are never lost.
/// Accessors cover the fields the live view renders; each returns `None` when the
/// field is absent or has an unexpected type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction(Value);

impl Prediction {
    /// Wrap a decoded payload
    pub fn new(data: Value) -> Self {
        Self(data)
    }

    /// Raw payload
    pub fn data(&self) -> &Value {
        &self.0
    }

    /// Recognised sign gloss, e.g. `HOLA`
    pub fn gloss(&self) -> Option<&str> {
        self.0.get("gloss")?.as_str()
    }

    /// Model confidence in `[0, 1]`
    pub fn confidence(&self) -> Option<f64> {
        self.0.get("confidence")?.as_f64()
    }

    /// Confidence as a whole percentage, 0 when unknown
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence().unwrap_or(0.0).clamp(0.0, 1.0) * 100.0).round() as u32
    }

    /// Translation of the current gloss
    pub fn text(&self) -> Option<&str> {
        self.0.get("text")?.as_str()
    }

    /// Running transcript of the conversation
    pub fn accumulated_text(&self) -> Option<&str> {
        self.0.get("accumulated_text")?.as_str()
    }

    /// Server-side processing latency
    pub fn processing_time_ms(&self) -> Option<f64> {
        self.0.get("processing_time_ms")?.as_f64()
    }

    /// Frames currently buffered by the service
    pub fn frames_in_buffer(&self) -> Option<u64> {
        self.0.get("frames_in_buffer")?.as_u64()
    }

    /// Frame sequence the prediction was produced for
    pub fn sequence(&self) -> Option<u64> {
        self.0.get("sequence")?.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_read_known_fields() {
        let prediction = Prediction::new(json!({
            "gloss": "HOLA",
            "confidence": 0.92,
            "text": "Hola",
            "accumulated_text": "Hola",
            "processing_time_ms": 41.5,
            "frames_in_buffer": 24,
            "sequence": 117
        }));

        assert_eq!(prediction.gloss(), Some("HOLA"));
        assert_eq!(prediction.confidence(), Some(0.92));
        assert_eq!(prediction.confidence_percent(), 92);
        assert_eq!(prediction.text(), Some("Hola"));
        assert_eq!(prediction.accumulated_text(), Some("Hola"));
        assert_eq!(prediction.processing_time_ms(), Some(41.5));
        assert_eq!(prediction.frames_in_buffer(), Some(24));
        assert_eq!(prediction.sequence(), Some(117));
    }

    #[test]
    fn missing_or_mistyped_fields_are_none() {
        let prediction = Prediction::new(json!({ "gloss": 7, "model": "v2" }));

        assert_eq!(prediction.gloss(), None);
        assert_eq!(prediction.confidence(), None);
        assert_eq!(prediction.confidence_percent(), 0);
        assert_eq!(prediction.data()["model"], "v2");
    }
}
