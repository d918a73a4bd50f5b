//! Scanner trait for advertisement sources

use std::time::Duration;

use crate::Result;
use crate::types::Advertisement;

/// Outcome of one scan request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// The interval elapsed; more advertisements may follow
    Continue,
    /// The source has nothing more to deliver (normal termination)
    Exhausted,
}

/// Trait for advertisement sources
///
/// Scanners abstract over the radio (live BLE) and recorded captures. Each call
/// scans for roughly `duration` and hands every advertisement to `sink` as soon
/// as it is seen, on the scanning task itself. The sink is cheap and never
/// blocks; a scanner must not buffer advertisements behind it.
///
/// Returns:
/// - `Ok(ScanStatus::Continue)` - interval completed
/// - `Ok(ScanStatus::Exhausted)` - source ended
/// - `Err(e)` - transient failure; the caller retries
#[async_trait::async_trait]
pub trait Scanner: Send + 'static {
    async fn scan(
        &mut self,
        duration: Duration,
        sink: &mut (dyn for<'a> FnMut(&'a Advertisement) + Send),
    ) -> Result<ScanStatus>;

    /// Release the radio after the last scan. A scan cut short by cancellation
    /// is dropped mid-flight, so cleanup it would have done happens here.
    async fn stop(&mut self) {}
}
