//! Scan loop: drives the scanner, decodes advertisements and feeds the writer

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::IngestSender;
use crate::config::ScanConfig;
use crate::decoder;
use crate::scanner::{ScanStatus, Scanner};
use crate::types::Advertisement;
use crate::writer::{WriterHandle, WriterStats};
use crate::{BridgeError, Result};

/// Why the scan loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Termination was requested through the cancellation token
    Cancelled,
    /// The scanner reported the end of its source
    Exhausted,
    /// The writer went away and readings could no longer be enqueued
    WriterGone,
}

/// Counters of the scan path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scans: u64,
    pub scan_errors: u64,
    pub advertisements: u64,
    pub readings: u64,
}

/// Final outcome of a bridge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub reason: StopReason,
    pub scan: ScanSummary,
    pub writer: WriterStats,
}

/// Drives a [`Scanner`] until cancelled, then drains the writer
pub struct ScanLoop<S: Scanner> {
    scanner: S,
    sender: IngestSender,
    writer: WriterHandle,
    policy: String,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl<S: Scanner> ScanLoop<S> {
    pub fn new(
        scanner: S,
        sender: IngestSender,
        writer: WriterHandle,
        policy: impl Into<String>,
        config: ScanConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self { scanner, sender, writer, policy: policy.into(), config, cancel }
    }

    /// Scan until cancelled or exhausted, then send the shutdown marker and wait
    /// for the writer to flush its last window.
    pub async fn run(mut self) -> Result<ScanReport> {
        info!(
            duration_secs = self.config.duration_secs,
            policy = %self.policy,
            "Scan loop started"
        );

        let mut summary = ScanSummary::default();
        let reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let mut writer_gone = false;
            let result = {
                let sender = &self.sender;
                let policy = self.policy.as_str();
                let counters = &mut summary;
                let gone = &mut writer_gone;
                let mut sink = |advert: &Advertisement| {
                    handle_advertisement(advert, sender, policy, counters, gone)
                };

                tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    result = self.scanner.scan(self.config.duration(), &mut sink) => Some(result),
                }
            };
            summary.scans += 1;

            if writer_gone {
                error!("Batch writer is gone, stopping scan loop");
                break StopReason::WriterGone;
            }

            match result {
                None => break StopReason::Cancelled,
                Some(Ok(ScanStatus::Continue)) => {}
                Some(Ok(ScanStatus::Exhausted)) => {
                    info!("Scanner exhausted");
                    break StopReason::Exhausted;
                }
                Some(Err(e)) => {
                    summary.scan_errors += 1;
                    warn!(error = %e, retryable = e.is_retryable(), "Scan failed, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break StopReason::Cancelled,
                        _ = tokio::time::sleep(self.config.retry_delay()) => {}
                    }
                }
            }
        };

        info!(
            ?reason,
            scans = summary.scans,
            scan_errors = summary.scan_errors,
            advertisements = summary.advertisements,
            readings = summary.readings,
            "Scan loop stopping, draining writer"
        );
        self.scanner.stop().await;
        self.sender.shutdown();
        let writer = self.writer.join().await?;

        Ok(ScanReport { reason, scan: summary, writer })
    }
}

fn handle_advertisement(
    advert: &Advertisement,
    sender: &IngestSender,
    policy: &str,
    summary: &mut ScanSummary,
    writer_gone: &mut bool,
) {
    summary.advertisements += 1;
    let Some(reading) = decoder::decode(advert) else {
        return;
    };

    debug!(
        address = %reading.address,
        sub_code = reading.service_uuid16,
        fields = ?reading.fields,
        "Decoded reading"
    );
    match sender.send(reading, policy) {
        Ok(()) => summary.readings += 1,
        Err(BridgeError::ChannelClosed) => *writer_gone = true,
        Err(e) => warn!(error = %e, "Failed to enqueue reading"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ingestion_channel;
    use crate::config::WriterConfig;
    use crate::test_utils::{
        RecordingStorage, ScanStep, ScriptedScanner, foreign_advertisement, sensor_values,
    };
    use crate::writer::BatchWriter;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn scan_loop(
        scanner: ScriptedScanner,
        storage: &RecordingStorage,
        cancel: CancellationToken,
    ) -> ScanLoop<ScriptedScanner> {
        let (tx, rx) = ingestion_channel();
        let writer = BatchWriter::new(storage.clone(), rx, WriterConfig::default()).spawn();
        ScanLoop::new(scanner, tx, writer, "long_term_storage_policy", ScanConfig::default(), cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn decoded_readings_reach_storage_under_policy() {
        let storage = RecordingStorage::new();
        let scanner = ScriptedScanner::new([ScanStep::Deliver(vec![
            sensor_values("AA:01", 7, &[10, -5, 7]),
            foreign_advertisement("AA:02", &[1, 0]),
            sensor_values("AA:03", 2, &[]),
        ])]);
        let calls = scanner.calls();

        let report = scan_loop(scanner, &storage, CancellationToken::new()).run().await.unwrap();

        assert_eq!(report.reason, StopReason::Exhausted);
        assert_eq!(report.scan.advertisements, 3);
        assert_eq!(report.scan.readings, 1);

        let writes = storage.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "long_term_storage_policy");
        assert_eq!(writes[0].1[0].fields, vec![10, -5, 7]);
        assert_eq!(writes[0].1[0].service_uuid16, 7);
        assert_eq!(calls.lock().unwrap()[0], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_errors_are_retried() {
        let storage = RecordingStorage::new();
        let scanner = ScriptedScanner::new([
            ScanStep::Fail("adapter busy".into()),
            ScanStep::Fail("adapter busy".into()),
            ScanStep::Deliver(vec![sensor_values("AA:01", 1, &[1])]),
        ]);

        let report = scan_loop(scanner, &storage, CancellationToken::new()).run().await.unwrap();

        assert_eq!(report.scan.scan_errors, 2);
        assert_eq!(report.scan.readings, 1);
        assert_eq!(report.writer.points_written, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_scan_and_drains_writer() {
        let storage = RecordingStorage::new();
        let scanner = ScriptedScanner::new([
            ScanStep::Deliver(vec![sensor_values("AA:01", 1, &[1]), sensor_values("AA:01", 1, &[2])]),
            ScanStep::Hang,
        ]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let report = scan_loop(scanner, &storage, cancel).run().await.unwrap();

        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.writer.points_written, 2);
        assert_eq!(report.writer.state, crate::writer::WriterState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn scanner_is_stopped_when_hung_scan_is_cancelled() {
        let storage = RecordingStorage::new();
        let scanner = ScriptedScanner::new([ScanStep::Hang]);
        let stops = scanner.stops();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = scan_loop(scanner, &storage, cancel).run().await.unwrap();

        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_sends_shutdown_immediately() {
        let storage = RecordingStorage::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = scan_loop(ScriptedScanner::default(), &storage, cancel).run().await.unwrap();

        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.scan.scans, 0);
        assert!(storage.writes().is_empty());
    }
}
