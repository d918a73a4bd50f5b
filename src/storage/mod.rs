//! Storage trait for time-series sinks

use crate::Result;
use crate::config::RetentionPolicy;
use crate::types::SensorReading;

pub mod influx;
pub mod line_protocol;

pub use influx::InfluxStorage;

/// Trait for time-series stores the batch writer flushes into
///
/// Writes are best-effort: the writer never retries a failed call, so an
/// implementation should return an error only once it has given up.
#[async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Write `points` in order under the retention policy `policy`.
    async fn write_points(&self, points: &[SensorReading], policy: &str) -> Result<()>;

    /// Create the database if it does not exist yet.
    async fn ensure_database(&self, name: &str) -> Result<()>;

    /// Create the retention policy on `database` if it does not exist yet.
    async fn ensure_retention_policy(&self, database: &str, policy: &RetentionPolicy) -> Result<()>;
}

#[async_trait::async_trait]
impl<S: Storage> Storage for std::sync::Arc<S> {
    async fn write_points(&self, points: &[SensorReading], policy: &str) -> Result<()> {
        (**self).write_points(points, policy).await
    }

    async fn ensure_database(&self, name: &str) -> Result<()> {
        (**self).ensure_database(name).await
    }

    async fn ensure_retention_policy(&self, database: &str, policy: &RetentionPolicy) -> Result<()> {
        (**self).ensure_retention_policy(database, policy).await
    }
}
