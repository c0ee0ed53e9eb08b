//! Bus configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "initial_backoff_ms": 100,
//!   "max_backoff_ms": 30000,
//!   "request_timeout_ms": 30000,
//!   "handshake_timeout_ms": 5000
//! }
//! ```
//!
//! `request_timeout_ms: null` disables request timeouts.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// First reconnection delay after the parent link drops.
    pub initial_backoff_ms: u64,
    /// Ceiling for the doubling reconnection delay.
    pub max_backoff_ms: u64,
    /// Per-request timeout; `None` waits forever.
    pub request_timeout_ms: Option<u64>,
    /// How long a connecting child waits for its assigned path.
    pub handshake_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            request_timeout_ms: Some(30_000),
            handshake_timeout_ms: 5_000,
        }
    }
}

impl BusConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
