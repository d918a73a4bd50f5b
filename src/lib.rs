//! Bridge from BLE sensor advertisements to time-series storage.
//!
//! Beaconbridge listens for broadcast advertisements, decodes the compact sensor
//! payload carried in 128-bit service data, and writes the readings to InfluxDB
//! in batches grouped by retention policy.
//!
//! # Architecture
//!
//! ```text
//! Scanner -> decoder -> ingestion channel -> BatchWriter -> Storage
//! ```
//!
//! The scan path and the writer run concurrently and share nothing but the
//! channel. Shutdown is a marker sent through that channel, so every reading
//! enqueued before it is flushed before the writer stops.
//!
//! ## Example (capture replay)
//!
//! ```rust,no_run
//! use beaconbridge::{Bridge, BridgeConfig, InfluxStorage, ReplayScanner};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> beaconbridge::Result<()> {
//!     let config = BridgeConfig::default();
//!     let storage = InfluxStorage::new(&config.storage);
//!     let bridge = Bridge::prepare(storage, config).await?;
//!
//!     let scanner = ReplayScanner::open("capture.yaml")?;
//!     let report = bridge.run(scanner, CancellationToken::new()).await?;
//!     println!("wrote {} readings", report.writer.points_written);
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
pub mod decoder;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Ingestion pipeline
pub mod bridge;
pub mod channel;
pub mod scan_loop;
pub mod writer;

// Collaborators
pub mod scanner;
pub mod scanners;
pub mod storage;

// Core exports
pub use config::{BridgeConfig, RetentionPolicy, ScanConfig, StorageConfig, WriterConfig};
pub use error::*;
pub use types::*;

// Main API exports
pub use bridge::Bridge;
pub use channel::{IngestReceiver, IngestSender, ingestion_channel};
pub use scan_loop::{ScanLoop, ScanReport, ScanSummary, StopReason};
pub use scanner::{ScanStatus, Scanner};
pub use scanners::{Capture, ReplayScanner};
pub use storage::{InfluxStorage, Storage};
pub use writer::{Batch, BatchWriter, WriterHandle, WriterState, WriterStats};

#[cfg(feature = "ble")]
pub use scanners::BleScanner;
