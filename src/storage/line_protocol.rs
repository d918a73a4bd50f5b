//! InfluxDB line protocol rendering

use std::fmt::Write;

use crate::types::{ADDRESS_TAG, MEASUREMENT, SUB_CODE_TAG, SensorReading};

/// Render one reading as a line protocol point with microsecond precision.
///
/// `sensordata,address=<addr>,service_uuid16=<n> field0=<v>i,... <epoch_us>`
pub fn render_point(reading: &SensorReading) -> String {
    let mut line = String::with_capacity(64 + reading.fields.len() * 12);
    line.push_str(&escape_measurement(MEASUREMENT));
    let _ = write!(
        line,
        ",{}={},{}={} ",
        ADDRESS_TAG,
        escape_tag(&reading.address),
        SUB_CODE_TAG,
        reading.service_uuid16
    );

    for (i, (name, value)) in reading.named_fields().enumerate() {
        if i > 0 {
            line.push(',');
        }
        let _ = write!(line, "{}={}i", name, value);
    }

    let _ = write!(line, " {}", reading.timestamp_micros());
    line
}

/// Render a batch, one point per line.
pub fn render_batch(readings: &[SensorReading]) -> String {
    readings.iter().map(render_point).collect::<Vec<_>>().join("\n")
}

fn escape_measurement(value: &str) -> String {
    escape(value, &[',', ' '])
}

fn escape_tag(value: &str) -> String {
    escape(value, &[',', '=', ' '])
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '\\' || special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
