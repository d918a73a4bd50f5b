//! Ingestion channel between the scan path and the batch writer
//!
//! Unbounded and multi-producer. Sending never waits. The consumer receives with
//! a timeout so that an idle gap marks the end of a flush window. Shutdown travels
//! through the same queue as data, so it is seen only after everything enqueued
//! before it.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::SensorReading;
use crate::{BridgeError, Result};

/// Items carried by the ingestion channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// A decoded reading destined for the named retention policy
    Reading { reading: SensorReading, policy: String },

    /// Terminates the writer after its current window is flushed
    Shutdown,
}

/// Outcome of a timed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A reading with its retention policy
    Item(SensorReading, String),

    /// The shutdown marker was received
    Shutdown,

    /// Nothing arrived within the timeout
    Idle,

    /// Every sender was dropped without sending the shutdown marker
    Disconnected,
}

/// Create a connected sender/receiver pair.
pub fn ingestion_channel() -> (IngestSender, IngestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = IngestSender { tx, shut_down: Arc::new(Mutex::new(false)) };
    (sender, IngestReceiver { rx })
}

/// Producer half. Cheap to clone; all clones share the shutdown state.
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::UnboundedSender<Ingest>,
    shut_down: Arc<Mutex<bool>>,
}

impl IngestSender {
    /// Enqueue a reading for `policy`.
    ///
    /// Fails only once shutdown has been requested or the writer has gone away.
    pub fn send(&self, reading: SensorReading, policy: impl Into<String>) -> Result<()> {
        let shut_down = self.shut_down.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *shut_down {
            return Err(BridgeError::ChannelClosed);
        }
        self.tx
            .send(Ingest::Reading { reading, policy: policy.into() })
            .map_err(|_| BridgeError::ChannelClosed)
    }

    /// Enqueue the shutdown marker. Only the first call sends it.
    ///
    /// Returns `true` if this call sent the marker.
    pub fn shutdown(&self) -> bool {
        let mut shut_down = self.shut_down.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *shut_down {
            return false;
        }
        *shut_down = true;
        if self.tx.send(Ingest::Shutdown).is_err() {
            warn!("Writer already gone when sending shutdown marker");
        } else {
            debug!("Shutdown marker enqueued");
        }
        true
    }

    /// Whether shutdown has been requested.
    pub fn is_shut_down(&self) -> bool {
        *self.shut_down.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Consumer half, owned by the batch writer.
#[derive(Debug)]
pub struct IngestReceiver {
    rx: mpsc::UnboundedReceiver<Ingest>,
}

impl IngestReceiver {
    /// Wait up to `timeout` for the next item.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Received {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(Ingest::Reading { reading, policy })) => Received::Item(reading, policy),
            Ok(Some(Ingest::Shutdown)) => Received::Shutdown,
            Ok(None) => Received::Disconnected,
            Err(_) => Received::Idle,
        }
    }

    /// Number of items waiting in the queue.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}
