//! Live BLE scanner (requires the `ble` feature)

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::scanner::{ScanStatus, Scanner};
use crate::types::Advertisement;
use crate::{BridgeError, Result};

type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

fn radio_error(reason: &str) -> impl FnOnce(btleplug::Error) -> BridgeError + '_ {
    move |e| BridgeError::scan_failed_with_source(reason, Box::new(e))
}

/// Scanner listening for service data advertisements on the first adapter
pub struct BleScanner {
    adapter: Adapter,
    events: EventStream,

    /// Set between `start_scan` and `stop_scan`
    scanning: bool,
}

impl BleScanner {
    /// Open the first Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await.map_err(radio_error("Bluetooth manager unavailable"))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(radio_error("Failed to list adapters"))?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::scan_failed("No Bluetooth adapter found"))?;

        match adapter.adapter_info().await {
            Ok(name) => info!(adapter = %name, "Bluetooth adapter opened"),
            Err(e) => warn!(error = %e, "Bluetooth adapter opened without info"),
        }

        let events = adapter.events().await.map_err(radio_error("Failed to subscribe to events"))?;
        Ok(Self { adapter, events, scanning: false })
    }

    async fn address_of(&self, id: &btleplug::platform::PeripheralId) -> String {
        match self.adapter.peripheral(id).await {
            Ok(peripheral) => peripheral.address().to_string(),
            Err(e) => {
                debug!(error = %e, "Peripheral lookup failed, using id as address");
                format!("{:?}", id)
            }
        }
    }

    async fn stop_scanning(&mut self) {
        if !self.scanning {
            return;
        }
        if let Err(e) = self.adapter.stop_scan().await {
            warn!(error = %e, "Failed to stop scan");
        }
        self.scanning = false;
    }
}

#[async_trait::async_trait]
impl Scanner for BleScanner {
    async fn scan(
        &mut self,
        duration: Duration,
        sink: &mut (dyn for<'a> FnMut(&'a Advertisement) + Send),
    ) -> Result<ScanStatus> {
        self.adapter.start_scan(ScanFilter::default()).await.map_err(radio_error("Failed to start scan"))?;
        self.scanning = true;
        let deadline = tokio::time::Instant::now() + duration;

        let outcome = loop {
            let event = match tokio::time::timeout_at(deadline, self.events.next()).await {
                Err(_) => break Ok(ScanStatus::Continue),
                Ok(None) => break Err(BridgeError::scan_failed("Bluetooth event stream ended")),
                Ok(Some(event)) => event,
            };

            if let CentralEvent::ServiceDataAdvertisement { id, service_data } = event {
                let address = self.address_of(&id).await;
                for (uuid, payload) in &service_data {
                    trace!(%address, %uuid, len = payload.len(), "Service data");
                    sink(&Advertisement::from_service(address.as_str(), uuid, payload));
                }
            }
        };

        self.stop_scanning().await;
        outcome
    }

    async fn stop(&mut self) {
        self.stop_scanning().await;
    }
}
