//! Decoded sensor readings

use chrono::{DateTime, SubsecRound, Utc};
use std::fmt;

/// Measurement name every reading is written under.
pub const MEASUREMENT: &str = "sensordata";

/// Tag key carrying the device address.
pub const ADDRESS_TAG: &str = "address";

/// Tag key carrying the service sub-code.
pub const SUB_CODE_TAG: &str = "service_uuid16";

/// A reading decoded from one sensor advertisement.
///
/// Fields are positional: index `i` is written as `field{i}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    /// Device address as reported by the scanner
    pub address: String,

    /// Sub-code from the service identifier
    pub service_uuid16: u16,

    /// Measurements in wire order
    pub fields: Vec<i16>,

    /// Decode instant, truncated to microseconds
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Create a reading stamped with the current time.
    pub fn new(address: impl Into<String>, service_uuid16: u16, fields: Vec<i16>) -> Self {
        Self::at(address, service_uuid16, fields, Utc::now())
    }

    /// Create a reading with an explicit timestamp.
    pub fn at(
        address: impl Into<String>,
        service_uuid16: u16,
        fields: Vec<i16>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            address: address.into(),
            service_uuid16,
            fields,
            timestamp: timestamp.trunc_subsecs(6),
        }
    }

    /// Measurement name (always [`MEASUREMENT`]).
    pub fn measurement(&self) -> &'static str {
        MEASUREMENT
    }

    /// Name of the field at `index`.
    pub fn field_name(index: usize) -> String {
        format!("field{}", index)
    }

    /// Named fields in positional order.
    pub fn named_fields(&self) -> impl Iterator<Item = (String, i16)> + '_ {
        self.fields.iter().enumerate().map(|(i, v)| (Self::field_name(i), *v))
    }

    /// ISO-8601 UTC timestamp at microsecond resolution.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
    }

    /// Microseconds since the Unix epoch.
    pub fn timestamp_micros(&self) -> i64 {
        self.timestamp.timestamp_micros()
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}={} {}={} {:?} @ {}",
            MEASUREMENT,
            ADDRESS_TAG,
            self.address,
            SUB_CODE_TAG,
            self.service_uuid16,
            self.fields,
            self.timestamp_string()
        )
    }
}
