//! Replay scanner for recorded advertisement captures

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::scanner::{ScanStatus, Scanner};
use crate::types::Advertisement;
use crate::{BridgeError, Result};

/// A recorded sequence of advertisements.
///
/// ```yaml
/// interval_ms: 100
/// advertisements:
///   - address: "C4:7C:8D:6A:10:01"
///     service_data: "0ffc04e98bd2cf8c074e39110007 6df9 0a00fbff0700"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    /// Pacing between advertisements
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub advertisements: Vec<Advertisement>,
}

fn default_interval_ms() -> u64 {
    100
}

impl Capture {
    /// Parse a capture document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let capture: Self = serde_yaml_ng::from_str(text)?;
        if capture.interval_ms == 0 {
            return Err(BridgeError::parse_error("capture", "interval_ms must be positive"));
        }
        Ok(capture)
    }
}

/// Scanner that replays a [`Capture`] at its recorded pace
pub struct ReplayScanner {
    capture: Capture,

    /// Index of the next advertisement to deliver
    position: usize,

    /// Advertisement pacing, started on the first scan
    interval: Option<Interval>,
}

impl ReplayScanner {
    /// Open a capture file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::file_error(path.to_path_buf(), e))?;
        let capture = Capture::from_yaml(&text)?;

        info!(
            path = %path.display(),
            advertisements = capture.advertisements.len(),
            interval_ms = capture.interval_ms,
            "Opened advertisement capture"
        );
        Ok(Self::new(capture))
    }

    /// Replay an in-memory capture.
    pub fn new(capture: Capture) -> Self {
        Self { capture, position: 0, interval: None }
    }

    /// Advertisements not yet delivered.
    pub fn remaining(&self) -> usize {
        self.capture.advertisements.len().saturating_sub(self.position)
    }
}

#[async_trait::async_trait]
impl Scanner for ReplayScanner {
    async fn scan(
        &mut self,
        duration: Duration,
        sink: &mut (dyn for<'a> FnMut(&'a Advertisement) + Send),
    ) -> Result<ScanStatus> {
        let deadline = Instant::now() + duration;
        let period = Duration::from_millis(self.capture.interval_ms.max(1));
        let pacing = self.interval.get_or_insert_with(|| {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        while let Some(advert) = self.capture.advertisements.get(self.position) {
            if tokio::time::timeout_at(deadline, pacing.tick()).await.is_err() {
                trace!(position = self.position, "Scan interval elapsed");
                return Ok(ScanStatus::Continue);
            }
            sink(advert);
            self.position += 1;
        }

        debug!("Reached end of capture");
        Ok(ScanStatus::Exhausted)
    }
}
