//! Client configuration.
//!
//! Configuration is read from an optional YAML file, then overridden from the
//! environment:
//!
//! - `COMSIGNS_API_URL` replaces `api_base_url`
//! - `COMSIGNS_WS_URL` sets an explicit socket `endpoint`
//!
//! ```rust
//! use comsigns_live::StreamConfig;
//!
//! let config = StreamConfig::from_yaml_str("api_base_url: http://localhost:8000\ncapture_fps: 5\n").unwrap();
//! assert_eq!(config.ws_endpoint().unwrap(), "ws://localhost:8000/ws/infer");
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::session::Backoff;
use crate::types::CaptureRate;
use crate::{Result, StreamError};

/// Environment variable overriding the API base url
pub const ENV_API_URL: &str = "COMSIGNS_API_URL";

/// Environment variable setting an explicit socket endpoint
pub const ENV_WS_URL: &str = "COMSIGNS_WS_URL";

/// Production inference service
pub const DEFAULT_API_BASE_URL: &str = "https://comsigns-multimodal-production.up.railway.app";

/// Path of the realtime inference socket
pub const DEFAULT_WS_PATH: &str = "/ws/infer";

/// Settings for one streaming client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// REST base url; the socket url is derived from it
    pub api_base_url: String,

    /// Socket path appended to the derived url
    pub ws_path: String,

    /// Explicit socket url, bypasses derivation
    pub endpoint: Option<String>,

    /// Pacing rate of the capture timer
    pub capture_fps: CaptureRate,

    /// Encoded frame width in pixels
    pub frame_width: u32,

    /// Encoded frame height in pixels
    pub frame_height: u32,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,

    /// First reconnection delay
    pub reconnect_base_ms: u64,

    /// Upper bound for reconnection delays
    pub reconnect_cap_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            endpoint: None,
            capture_fps: CaptureRate::default(),
            frame_width: 640,
            frame_height: 480,
            jpeg_quality: 80,
            reconnect_base_ms: 3_000,
            reconnect_cap_ms: 30_000,
        }
    }
}

impl StreamConfig {
    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StreamError::config_error("YAML", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Apply `COMSIGNS_API_URL` / `COMSIGNS_WS_URL` overrides
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(std::env::var(ENV_API_URL).ok(), std::env::var(ENV_WS_URL).ok())
    }

    fn apply_overrides(mut self, api_url: Option<String>, ws_url: Option<String>) -> Result<Self> {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(url) = ws_url.filter(|u| !u.trim().is_empty()) {
            self.endpoint = Some(url);
        }
        self.validate()?;
        Ok(self)
    }

    /// Socket url of the realtime inference endpoint
    ///
    /// Uses `endpoint` when set; otherwise swaps the `http` prefix of
    /// `api_base_url` for `ws` (`https` becomes `wss`) and appends `ws_path`.
    pub fn ws_endpoint(&self) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let base = self.api_base_url.trim_end_matches('/');
        let rest = base.strip_prefix("http").ok_or_else(|| {
            StreamError::config_error(
                "api_base_url",
                format!("expected an http(s) url, got '{}'", self.api_base_url),
            )
        })?;
        Ok(format!("ws{rest}{}", self.ws_path))
    }

    /// Reconnection policy described by this configuration
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_base_ms),
            Duration::from_millis(self.reconnect_cap_ms),
        )
    }

    /// Check value ranges and url schemes
    pub fn validate(&self) -> Result<()> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(StreamError::config_error(
                "frame size",
                format!("{}x{} has a zero dimension", self.frame_width, self.frame_height),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(StreamError::config_error(
                "jpeg_quality",
                format!("{} is outside 1-100", self.jpeg_quality),
            ));
        }
        if self.reconnect_base_ms == 0 {
            return Err(StreamError::config_error("reconnect_base_ms", "must be positive"));
        }
        if self.reconnect_cap_ms < self.reconnect_base_ms {
            return Err(StreamError::config_error(
                "reconnect_cap_ms",
                format!(
                    "cap {}ms is below base {}ms",
                    self.reconnect_cap_ms, self.reconnect_base_ms
                ),
            ));
        }

        let endpoint = self.ws_endpoint()?;
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(StreamError::config_error(
                "endpoint",
                format!("'{endpoint}' is not a ws:// or wss:// url"),
            ));
        }
        Ok(())
    }
}
