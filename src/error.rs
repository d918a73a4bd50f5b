//! Error types for the advertisement bridge.
//!
//! Every fallible operation in the crate returns [`BridgeError`]. Decoding never
//! fails: an advertisement that does not carry a recognised sensor payload is a
//! filter outcome (`None`), not an error.
//!
//! ## Error Categories
//!
//! - **Scan Errors**: The radio collaborator failed for one scan interval
//! - **Storage Errors**: The time-series store rejected or did not answer a request
//! - **Config Errors**: Invalid or contradictory settings
//! - **File Errors**: Capture or configuration files could not be read
//! - **Parse Errors**: Malformed capture files or storage responses
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use beaconbridge::BridgeError;
//!
//! let error = BridgeError::scan_failed("adapter powered off");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Scan failed: {reason}")]
    Scan {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage {operation} failed: {reason}")]
    Storage {
        operation: String,
        reason: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration for '{key}': {reason}")]
    Config { key: String, reason: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Ingestion channel closed")]
    ChannelClosed,
}

impl BridgeError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Scan { .. } => true,
            BridgeError::Storage { status, .. } => !matches!(status, Some(400..=499)),
            BridgeError::Timeout { .. } => true,
            BridgeError::Config { .. } => false,
            BridgeError::File { .. } => false,
            BridgeError::Parse { .. } => false,
            BridgeError::ChannelClosed => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::Scan { .. } => vec![
                "Check that the Bluetooth adapter is powered on",
                "Verify the process may access the Bluetooth stack",
                "Restart the Bluetooth service",
            ],
            BridgeError::Storage { .. } => vec![
                "Ensure InfluxDB is running and reachable",
                "Verify storage host, port and credentials",
                "Check that the database and retention policy exist",
            ],
            BridgeError::Config { .. } => vec![
                "Review the configuration file and command line flags",
                "Remove the offending option to fall back to its default",
            ],
            BridgeError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            BridgeError::Parse { .. } => vec![
                "Verify source data integrity",
                "Check the capture file format",
            ],
            BridgeError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Check network latency to the storage host",
            ],
            BridgeError::ChannelClosed => vec![
                "Check whether the batch writer task panicked",
                "Restart the bridge",
            ],
        }
    }

    /// Helper constructor for scan failures.
    pub fn scan_failed(reason: impl Into<String>) -> Self {
        BridgeError::Scan { reason: reason.into(), source: None }
    }

    /// Helper constructor for scan failures with source.
    pub fn scan_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::Scan { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for storage failures.
    pub fn storage_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Storage {
            operation: operation.into(),
            reason: reason.into(),
            status: None,
            source: None,
        }
    }

    /// Helper constructor for storage responses with a non-success HTTP status.
    pub fn storage_status(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        BridgeError::Storage {
            operation: operation.into(),
            reason: format!("HTTP {}: {}", status, body.into()),
            status: Some(status),
            source: None,
        }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(key: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Config { key: key.into(), reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        BridgeError::File { path, source }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        BridgeError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        BridgeError::Storage {
            operation: "request".to_string(),
            reason: err.to_string(),
            status,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml_ng::Error> for BridgeError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        BridgeError::Parse { context: "YAML".to_string(), details: err.to_string() }
    }
}
