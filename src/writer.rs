//! Batch writer: drains the ingestion channel in windows and flushes per policy
//!
//! The writer alternates between two phases until shutdown:
//!
//! ```text
//!   Draining --(idle gap | shutdown | window full)--> Flushing --+--> Draining
//!                                                                +--> Stopped (after shutdown)
//! ```
//!
//! A failed flush discards the rest of its window. Nothing is retried; the loss
//! is logged and counted in [`WriterStats`], which is published on a watch
//! channel after every window.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{IngestReceiver, Received};
use crate::config::WriterConfig;
use crate::storage::Storage;
use crate::types::SensorReading;
use crate::{BridgeError, Result};

/// Phase of the writer loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriterState {
    /// Accumulating one window
    #[default]
    Draining,
    /// Issuing one bulk write per policy
    Flushing,
    /// Terminal, after the shutdown window was flushed
    Stopped,
}

/// Counters describing everything the writer has done so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub state: WriterState,
    /// Windows that held readings and were written completely
    pub windows_flushed: u64,
    /// Windows abandoned because a write failed
    pub windows_failed: u64,
    pub points_written: u64,
    /// Readings lost with failed windows
    pub points_dropped: u64,
    pub last_error: Option<String>,
}

/// Readings of one window grouped by retention policy.
///
/// Policies keep first-seen order; readings keep arrival order within a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    groups: Vec<(String, Vec<SensorReading>)>,
    len: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `reading` to the group for `policy`.
    pub fn push(&mut self, policy: String, reading: SensorReading) {
        match self.groups.iter_mut().find(|(name, _)| *name == policy) {
            Some((_, readings)) => readings.push(reading),
            None => self.groups.push((policy, vec![reading])),
        }
        self.len += 1;
    }

    /// Total readings across all policies.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Readings queued for `policy`.
    pub fn get(&self, policy: &str) -> Option<&[SensorReading]> {
        self.groups.iter().find(|(name, _)| name == policy).map(|(_, readings)| readings.as_slice())
    }

    /// Policy groups in first-seen order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[SensorReading])> {
        self.groups.iter().map(|(name, readings)| (name.as_str(), readings.as_slice()))
    }
}

/// How far a flush got before it returned, failed or panicked.
#[derive(Debug, Default)]
struct FlushProgress {
    /// Readings acknowledged by storage
    written: usize,
    /// Policy of the write in flight
    policy: String,
}

/// Handle to a spawned writer
pub struct WriterHandle {
    join: JoinHandle<WriterStats>,
    stats: watch::Receiver<WriterStats>,
}

impl WriterHandle {
    /// Live view of the writer's counters.
    pub fn stats(&self) -> watch::Receiver<WriterStats> {
        self.stats.clone()
    }

    /// Wait for the writer to reach [`WriterState::Stopped`].
    pub async fn join(self) -> Result<WriterStats> {
        self.join.await.map_err(|e| {
            error!("Writer task failed: {}", e);
            let reason = match e.try_into_panic() {
                Ok(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
                Err(e) => e.to_string(),
            };
            BridgeError::storage_failed("writer", reason)
        })
    }
}

/// Background worker that owns all storage I/O
pub struct BatchWriter<S: Storage> {
    storage: S,
    receiver: IngestReceiver,
    config: WriterConfig,
    stats: watch::Sender<WriterStats>,
}

impl<S: Storage> BatchWriter<S> {
    pub fn new(storage: S, receiver: IngestReceiver, config: WriterConfig) -> Self {
        let (stats, _) = watch::channel(WriterStats::default());
        Self { storage, receiver, config, stats }
    }

    /// Subscribe to the writer's counters.
    pub fn stats(&self) -> watch::Receiver<WriterStats> {
        self.stats.subscribe()
    }

    /// Run the writer on its own task.
    pub fn spawn(self) -> WriterHandle {
        let stats = self.stats();
        let join = tokio::spawn(self.run());
        WriterHandle { join, stats }
    }

    /// Drain and flush windows until the shutdown marker has been flushed.
    pub async fn run(mut self) -> WriterStats {
        info!(
            window_idle_ms = self.config.window_idle_ms,
            max_window_readings = ?self.config.max_window_readings,
            "Batch writer started"
        );

        let mut terminate = false;
        while !terminate {
            let mut batch = Batch::new();
            self.set_state(WriterState::Draining);
            terminate = self.drain(&mut batch).await;

            if batch.is_empty() {
                continue;
            }

            self.set_state(WriterState::Flushing);
            let mut progress = FlushProgress::default();
            let outcome = AssertUnwindSafe(self.flush(&batch, &mut progress)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {
                    self.stats.send_modify(|s| {
                        s.windows_flushed += 1;
                        s.points_written += progress.written as u64;
                    });
                }
                Ok(Err(error)) => self.record_failure(&batch, &progress, error),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    let error = BridgeError::storage_failed("write", format!("panicked: {}", message));
                    self.record_failure(&batch, &progress, error);
                }
            }
        }

        self.set_state(WriterState::Stopped);
        let stats = self.stats.borrow().clone();
        info!(
            windows_flushed = stats.windows_flushed,
            windows_failed = stats.windows_failed,
            points_written = stats.points_written,
            points_dropped = stats.points_dropped,
            "Batch writer stopped"
        );
        stats
    }

    /// Fill `batch` until the window ends. Returns `true` if the writer must stop
    /// after this window.
    async fn drain(&mut self, batch: &mut Batch) -> bool {
        let idle = self.config.window_idle();
        loop {
            match self.receiver.recv_timeout(idle).await {
                Received::Item(reading, policy) => {
                    batch.push(policy, reading);
                    if self.config.max_window_readings.is_some_and(|max| batch.len() >= max) {
                        debug!(count = batch.len(), "Window full");
                        return false;
                    }
                }
                Received::Idle => return false,
                Received::Shutdown => {
                    debug!(pending = batch.len(), "Shutdown marker received");
                    return true;
                }
                Received::Disconnected => {
                    warn!(pending = batch.len(), "All producers dropped without shutdown marker");
                    return true;
                }
            }
        }
    }

    /// One bulk write per non-empty policy group. Stops at the first failure.
    async fn flush(&self, batch: &Batch, progress: &mut FlushProgress) -> Result<()> {
        for (policy, readings) in batch.groups() {
            let Some(last) = readings.last() else {
                continue;
            };

            progress.policy = policy.to_string();
            self.storage.write_points(readings, policy).await?;
            progress.written += readings.len();
            info!(policy, count = readings.len(), last = %last, "Flushed readings");
        }
        Ok(())
    }

    fn record_failure(&self, batch: &Batch, progress: &FlushProgress, error: BridgeError) {
        let dropped = batch.len() - progress.written;
        error!(
            policy = %progress.policy,
            dropped,
            window = batch.len(),
            error = %error,
            "Window flush failed, discarding remaining readings"
        );
        self.stats.send_modify(|s| {
            s.windows_failed += 1;
            s.points_written += progress.written as u64;
            s.points_dropped += dropped as u64;
            s.last_error = Some(error.to_string());
        });
    }

    fn set_state(&self, state: WriterState) {
        self.stats.send_if_modified(|s| {
            let changed = s.state != state;
            s.state = state;
            changed
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ingestion_channel;
    use crate::test_utils::{RecordingStorage, reading};

    fn writer(storage: &RecordingStorage, config: WriterConfig) -> (crate::channel::IngestSender, WriterHandle) {
        let (tx, rx) = ingestion_channel();
        let handle = BatchWriter::new(storage.clone(), rx, config).spawn();
        (tx, handle)
    }

    #[test]
    fn batch_groups_by_policy_in_arrival_order() {
        let mut batch = Batch::new();
        batch.push("A".into(), reading("r1", 1));
        batch.push("B".into(), reading("r2", 2));
        batch.push("A".into(), reading("r3", 3));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.get("A").unwrap(), &[reading("r1", 1), reading("r3", 3)]);
        assert_eq!(batch.get("B").unwrap(), &[reading("r2", 2)]);
        assert_eq!(batch.groups().map(|(p, _)| p).collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn one_window_issues_one_write_per_policy() {
        let storage = RecordingStorage::new();
        let (tx, handle) = writer(&storage, WriterConfig::default());

        tx.send(reading("r1", 1), "A").unwrap();
        tx.send(reading("r2", 2), "B").unwrap();
        tx.send(reading("r3", 3), "A").unwrap();
        tx.shutdown();

        let stats = handle.join().await.unwrap();

        assert_eq!(
            storage.writes(),
            vec![
                ("A".to_string(), vec![reading("r1", 1), reading("r3", 3)]),
                ("B".to_string(), vec![reading("r2", 2)]),
            ]
        );
        assert_eq!(stats.windows_flushed, 1);
        assert_eq!(stats.points_written, 3);
        assert_eq!(stats.state, WriterState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_readings_once() {
        let storage = RecordingStorage::new();
        let (tx, handle) = writer(&storage, WriterConfig::default());

        for i in 0..5 {
            tx.send(reading("dev", i), "A").unwrap();
        }
        tx.shutdown();
        handle.join().await.unwrap();

        let writes = storage.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.len(), 5);
        assert!(matches!(tx.send(reading("late", 9), "A"), Err(BridgeError::ChannelClosed)));
        assert_eq!(storage.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_gap_splits_windows() {
        let storage = RecordingStorage::new();
        let (tx, handle) = writer(&storage, WriterConfig::default());
        let mut stats = handle.stats();

        tx.send(reading("r1", 1), "A").unwrap();
        stats.wait_for(|s| s.windows_flushed == 1).await.unwrap();

        tx.send(reading("r2", 2), "A").unwrap();
        tx.shutdown();
        let stats = handle.join().await.unwrap();

        assert_eq!(
            storage.writes(),
            vec![("A".to_string(), vec![reading("r1", 1)]), ("A".to_string(), vec![reading("r2", 2)])]
        );
        assert_eq!(stats.windows_flushed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_window_is_dropped_and_writer_continues() {
        let storage = RecordingStorage::new();
        storage.fail_next_writes(1);
        let (tx, handle) = writer(&storage, WriterConfig::default());
        let mut stats = handle.stats();

        tx.send(reading("lost-a", 1), "A").unwrap();
        tx.send(reading("lost-b", 2), "B").unwrap();
        stats.wait_for(|s| s.windows_failed == 1).await.unwrap();

        tx.send(reading("kept", 3), "A").unwrap();
        tx.shutdown();
        let stats = handle.join().await.unwrap();

        assert_eq!(storage.writes(), vec![("A".to_string(), vec![reading("kept", 3)])]);
        assert_eq!(stats.windows_failed, 1);
        assert_eq!(stats.points_dropped, 2);
        assert_eq!(stats.points_written, 1);
        assert!(stats.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_first_policy_keeps_what_was_written() {
        let storage = RecordingStorage::new();
        storage.fail_policy("B");
        let (tx, handle) = writer(&storage, WriterConfig::default());

        tx.send(reading("a", 1), "A").unwrap();
        tx.send(reading("b", 2), "B").unwrap();
        tx.send(reading("c", 3), "C").unwrap();
        tx.shutdown();
        let stats = handle.join().await.unwrap();

        assert_eq!(storage.writes(), vec![("A".to_string(), vec![reading("a", 1)])]);
        assert_eq!(stats.points_written, 1);
        assert_eq!(stats.points_dropped, 2);
        assert_eq!(stats.state, WriterState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_storage_does_not_kill_the_writer() {
        let storage = RecordingStorage::new();
        storage.panic_next_write();
        let (tx, handle) = writer(&storage, WriterConfig::default());
        let mut stats = handle.stats();

        tx.send(reading("boom", 1), "A").unwrap();
        stats.wait_for(|s| s.windows_failed == 1).await.unwrap();

        tx.send(reading("ok", 2), "A").unwrap();
        tx.shutdown();
        let stats = handle.join().await.unwrap();

        assert_eq!(storage.writes(), vec![("A".to_string(), vec![reading("ok", 2)])]);
        assert!(stats.last_error.unwrap().contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn panic_on_second_policy_counts_first_as_written() {
        let storage = RecordingStorage::new();
        storage.panic_on_policy("B");
        let (tx, handle) = writer(&storage, WriterConfig::default());

        tx.send(reading("a", 1), "A").unwrap();
        tx.send(reading("b", 2), "B").unwrap();
        tx.shutdown();
        let stats = handle.join().await.unwrap();

        assert_eq!(storage.writes(), vec![("A".to_string(), vec![reading("a", 1)])]);
        assert_eq!(stats.windows_failed, 1);
        assert_eq!(stats.points_written, 1);
        assert_eq!(stats.points_dropped, 1);
    }

    async fn exploding_writer() -> WriterStats {
        panic!("writer blew up")
    }

    #[tokio::test]
    async fn join_reports_writer_panic_cause() {
        let stats = watch::channel(WriterStats::default()).1;
        let join = tokio::spawn(exploding_writer());
        let handle = WriterHandle { join, stats };

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, BridgeError::Storage { .. }));
        assert!(err.to_string().contains("writer blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_window_flushes_early() {
        let storage = RecordingStorage::new();
        let config = WriterConfig { max_window_readings: Some(2), ..Default::default() };
        let (tx, handle) = writer(&storage, config);

        for i in 0..3 {
            tx.send(reading("dev", i), "A").unwrap();
        }
        tx.shutdown();
        handle.join().await.unwrap();

        let sizes: Vec<_> = storage.writes().iter().map(|(_, r)| r.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_producers_stop_the_writer() {
        let storage = RecordingStorage::new();
        let (tx, handle) = writer(&storage, WriterConfig::default());

        tx.send(reading("r1", 1), "A").unwrap();
        drop(tx);
        let stats = handle.join().await.unwrap();

        assert_eq!(stats.points_written, 1);
        assert_eq!(stats.state, WriterState::Stopped);
    }
}
