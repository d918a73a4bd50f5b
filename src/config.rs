//! Bridge configuration
//!
//! Every option has a default. A YAML file may override any subset of them and
//! the binary applies command line / environment overrides on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{BridgeError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub storage: StorageConfig,
    pub retention: RetentionPolicy,
    pub scan: ScanConfig,
    pub writer: WriterConfig,
}

/// Connection settings for the time-series store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8086,
            username: "root".to_string(),
            password: "root".to_string(),
            database: "SENSORDATA".to_string(),
        }
    }
}

impl StorageConfig {
    /// HTTP base URL of the storage API.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Retention policy readings are written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub name: String,

    /// Storage-side duration literal (e.g. `52w`)
    pub duration: String,

    pub replication: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { name: "long_term_storage_policy".to_string(), duration: "52w".to_string(), replication: 1 }
    }
}

/// Radio scanning settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Length of one scan request
    pub duration_secs: u64,

    /// Pause before retrying after a failed scan
    pub retry_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { duration_secs: 10, retry_delay_ms: 1000 }
    }
}

impl ScanConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Batch writer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// An idle gap this long ends the current window
    pub window_idle_ms: u64,

    /// Flush early once a window holds this many readings
    pub max_window_readings: Option<usize>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self { window_idle_ms: 1000, max_window_readings: None }
    }
}

impl WriterConfig {
    pub fn window_idle(&self) -> Duration {
        Duration::from_millis(self.window_idle_ms)
    }
}

impl BridgeConfig {
    /// Load a configuration file, falling back to defaults for missing keys.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::file_error(path.to_path_buf(), e))?;
        let config = Self::from_yaml(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml_ng::from_str(text)?;
        Ok(config)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.host.trim().is_empty() {
            return Err(BridgeError::config_error("storage.host", "must not be empty"));
        }
        if self.storage.database.trim().is_empty() {
            return Err(BridgeError::config_error("storage.database", "must not be empty"));
        }
        if self.retention.name.trim().is_empty() {
            return Err(BridgeError::config_error("retention.name", "must not be empty"));
        }
        if self.retention.duration.trim().is_empty() {
            return Err(BridgeError::config_error("retention.duration", "must not be empty"));
        }
        if self.retention.replication == 0 {
            return Err(BridgeError::config_error("retention.replication", "must be at least 1"));
        }
        if self.scan.duration_secs == 0 {
            return Err(BridgeError::config_error("scan.duration_secs", "must be positive"));
        }
        if self.writer.window_idle_ms == 0 {
            return Err(BridgeError::config_error("writer.window_idle_ms", "must be positive"));
        }
        if self.writer.max_window_readings == Some(0) {
            return Err(BridgeError::config_error("writer.max_window_readings", "must be positive"));
        }
        Ok(())
    }
}
