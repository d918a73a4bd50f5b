//! Bridge wiring: storage preparation, writer and scan loop

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;
use crate::channel::ingestion_channel;
use crate::config::BridgeConfig;
use crate::scan_loop::{ScanLoop, ScanReport};
use crate::scanner::Scanner;
use crate::storage::Storage;
use crate::writer::BatchWriter;

/// A prepared bridge between a scanner and a storage backend
pub struct Bridge<S: Storage> {
    storage: S,
    config: BridgeConfig,
}

impl<S: Storage> Bridge<S> {
    /// Validate the configuration and make sure the database and retention
    /// policy exist. Failing to reach storage here is fatal.
    pub async fn prepare(storage: S, config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        storage.ensure_database(&config.storage.database).await?;
        storage.ensure_retention_policy(&config.storage.database, &config.retention).await?;

        info!(
            database = %config.storage.database,
            policy = %config.retention.name,
            "Storage prepared"
        );
        Ok(Self { storage, config })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run until `cancel` fires or the scanner is exhausted, then drain the writer.
    pub async fn run<Sc: Scanner>(self, scanner: Sc, cancel: CancellationToken) -> Result<ScanReport> {
        let (sender, receiver) = ingestion_channel();
        let writer = BatchWriter::new(self.storage, receiver, self.config.writer.clone()).spawn();

        ScanLoop::new(scanner, sender, writer, self.config.retention.name, self.config.scan, cancel)
            .run()
            .await
    }
}
