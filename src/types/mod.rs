//! Core types for the advertisement bridge.
//!
//! - [`Advertisement`] is what a scanner hands over: a device address and the raw
//!   128-bit service data block.
//! - [`ServiceIdentity`] splits the block's identifier into base and sub-code.
//! - [`SensorReading`] is the decoded, timestamped reading that flows to storage.
//!
//! ## Usage Example
//!
//! ```rust
//! use beaconbridge::types::{ServiceIdentity, SENSOR_BASE_UUID};
//!
//! let wire = ServiceIdentity::sensor(7).to_wire();
//! let identity = ServiceIdentity::from_wire(wire);
//!
//! assert_eq!(identity.base, SENSOR_BASE_UUID);
//! assert_eq!(identity.sub_code, 7);
//! ```

mod advertisement;
mod identity;
mod reading;

pub use advertisement::Advertisement;
pub use identity::{IDENTIFIER_LEN, SENSOR_BASE_UUID, ServiceIdentity, uuid_to_wire};
pub use reading::{ADDRESS_TAG, MEASUREMENT, SUB_CODE_TAG, SensorReading};
