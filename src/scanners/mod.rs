//! Scanner implementations

#[cfg(feature = "ble")]
pub mod ble;
pub mod replay;

#[cfg(feature = "ble")]
pub use ble::BleScanner;
pub use replay::{Capture, ReplayScanner};
