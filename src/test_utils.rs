//! Test utilities: storage and scanner doubles plus advertisement builders
//!
//! Shared by unit tests, integration tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::RetentionPolicy;
use crate::scanner::{ScanStatus, Scanner};
use crate::storage::Storage;
use crate::types::{Advertisement, SENSOR_BASE_UUID, SensorReading, ServiceIdentity};
use crate::{BridgeError, Result};

/// Fixed instant used for deterministic readings.
pub fn fixed_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().unwrap_or_default()
}

/// Reading from `address` whose single field is `value`.
pub fn reading(address: &str, value: i16) -> SensorReading {
    SensorReading::at(address, 1, vec![value], fixed_timestamp())
}

/// Advertisement from a recognised sensor with the given sub-code and raw payload.
pub fn sensor_advertisement(address: &str, sub_code: u16, payload: &[u8]) -> Advertisement {
    let mut block = ServiceIdentity::sensor(sub_code).to_wire().to_vec();
    block.extend_from_slice(payload);
    Advertisement::new(address, Some(block))
}

/// Advertisement from a recognised sensor carrying `values` as i16 LE.
pub fn sensor_values(address: &str, sub_code: u16, values: &[i16]) -> Advertisement {
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    sensor_advertisement(address, sub_code, &payload)
}

/// Advertisement whose identifier differs from the sensor base outside the sub-code.
pub fn foreign_advertisement(address: &str, payload: &[u8]) -> Advertisement {
    let mut identity = ServiceIdentity::sensor(0);
    identity.base = uuid::Uuid::from_u128(SENSOR_BASE_UUID.as_u128() ^ 1);
    let mut block = identity.to_wire().to_vec();
    block.extend_from_slice(payload);
    Advertisement::new(address, Some(block))
}

#[derive(Debug, Default)]
struct RecordingState {
    writes: Vec<(String, Vec<SensorReading>)>,
    databases: Vec<String>,
    policies: Vec<(String, RetentionPolicy)>,
    fail_writes: usize,
    fail_policy: Option<String>,
    panic_next: bool,
    panic_policy: Option<String>,
    unreachable: bool,
}

/// In-memory storage that records successful writes and can inject failures.
#[derive(Debug, Clone, Default)]
pub struct RecordingStorage {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `n` write calls.
    pub fn fail_next_writes(&self, n: usize) {
        self.state().fail_writes = n;
    }

    /// Fail every write to `policy`.
    pub fn fail_policy(&self, policy: &str) {
        self.state().fail_policy = Some(policy.to_string());
    }

    /// Panic inside the next write call.
    pub fn panic_next_write(&self) {
        self.state().panic_next = true;
    }

    /// Panic inside every write to `policy`.
    pub fn panic_on_policy(&self, policy: &str) {
        self.state().panic_policy = Some(policy.to_string());
    }

    /// Fail every call as if the server could not be reached.
    pub fn set_unreachable(&self) {
        self.state().unreachable = true;
    }

    /// Successful writes in call order.
    pub fn writes(&self) -> Vec<(String, Vec<SensorReading>)> {
        self.state().writes.clone()
    }

    /// Databases ensured so far.
    pub fn databases(&self) -> Vec<String> {
        self.state().databases.clone()
    }

    /// Retention policies ensured so far, with their database.
    pub fn retention_policies(&self) -> Vec<(String, RetentionPolicy)> {
        self.state().policies.clone()
    }
}

#[async_trait::async_trait]
impl Storage for RecordingStorage {
    async fn write_points(&self, points: &[SensorReading], policy: &str) -> Result<()> {
        let mut state = self.state();
        if state.panic_next || state.panic_policy.as_deref() == Some(policy) {
            state.panic_next = false;
            drop(state);
            panic!("storage exploded");
        }
        if state.unreachable {
            return Err(BridgeError::storage_failed("write", "connection refused"));
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(BridgeError::storage_status("write", 500, "injected failure"));
        }
        if state.fail_policy.as_deref() == Some(policy) {
            return Err(BridgeError::storage_status("write", 404, "retention policy not found"));
        }
        state.writes.push((policy.to_string(), points.to_vec()));
        Ok(())
    }

    async fn ensure_database(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.unreachable {
            return Err(BridgeError::storage_failed("query", "connection refused"));
        }
        if !state.databases.iter().any(|db| db == name) {
            state.databases.push(name.to_string());
        }
        Ok(())
    }

    async fn ensure_retention_policy(&self, database: &str, policy: &RetentionPolicy) -> Result<()> {
        let mut state = self.state();
        if state.unreachable {
            return Err(BridgeError::storage_failed("query", "connection refused"));
        }
        if !state.policies.iter().any(|(db, p)| db == database && p.name == policy.name) {
            state.policies.push((database.to_string(), policy.clone()));
        }
        Ok(())
    }
}

/// One scripted response of a [`ScriptedScanner`].
#[derive(Debug)]
pub enum ScanStep {
    /// Deliver these advertisements, then report `Continue`
    Deliver(Vec<Advertisement>),
    /// Fail the scan
    Fail(String),
    /// Wait until cancelled (simulates a long radio scan)
    Hang,
}

/// Scanner replaying a fixed script of steps, then reporting `Exhausted`.
#[derive(Debug, Default)]
pub struct ScriptedScanner {
    steps: VecDeque<ScanStep>,
    calls: Arc<Mutex<Vec<Duration>>>,
    stops: Arc<AtomicUsize>,
}

impl ScriptedScanner {
    pub fn new(steps: impl IntoIterator<Item = ScanStep>) -> Self {
        Self { steps: steps.into_iter().collect(), calls: Arc::default(), stops: Arc::default() }
    }

    /// Shared log of requested scan durations.
    pub fn calls(&self) -> Arc<Mutex<Vec<Duration>>> {
        Arc::clone(&self.calls)
    }

    /// Shared count of `stop` calls.
    pub fn stops(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }
}

#[async_trait::async_trait]
impl Scanner for ScriptedScanner {
    async fn scan(
        &mut self,
        duration: Duration,
        sink: &mut (dyn for<'a> FnMut(&'a Advertisement) + Send),
    ) -> Result<ScanStatus> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).push(duration);
        match self.steps.pop_front() {
            Some(ScanStep::Deliver(adverts)) => {
                for advert in &adverts {
                    sink(advert);
                }
                Ok(ScanStatus::Continue)
            }
            Some(ScanStep::Fail(reason)) => Err(BridgeError::scan_failed(reason)),
            Some(ScanStep::Hang) => {
                std::future::pending::<()>().await;
                Ok(ScanStatus::Continue)
            }
            None => Ok(ScanStatus::Exhausted),
        }
    }

    async fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
