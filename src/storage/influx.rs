//! InfluxDB 1.x storage over the HTTP API

use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, info, trace};

use super::Storage;
use super::line_protocol::render_batch;
use crate::config::{RetentionPolicy, StorageConfig};
use crate::types::SensorReading;
use crate::{BridgeError, Result};

/// Storage backed by an InfluxDB 1.x server
pub struct InfluxStorage {
    base_url: String,
    database: String,
    username: String,
    password: String,
    client: Client,
}

impl InfluxStorage {
    /// Create a client for the configured server. No request is made yet.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_url: config.base_url(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: Client::new(),
        }
    }

    /// Database points are written into.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run an InfluxQL statement and return the decoded response.
    async fn query(&self, statement: &str) -> Result<Value> {
        trace!(statement, "InfluxQL");
        let params = [("q", statement), ("u", self.username.as_str()), ("p", self.password.as_str())];

        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .form(&params)
            .send()
            .await?;
        let body: Value = check_status("query", response).await?.json().await?;

        if let Some(message) = statement_error(&body) {
            return Err(BridgeError::storage_failed("query", message));
        }
        Ok(body)
    }

    /// Names of the retention policies defined on `database`.
    pub async fn retention_policies(&self, database: &str) -> Result<Vec<String>> {
        let body = self
            .query(&format!("SHOW RETENTION POLICIES ON {}", quote_ident(database)))
            .await?;
        Ok(policy_names(&body))
    }
}

#[async_trait::async_trait]
impl Storage for InfluxStorage {
    async fn write_points(&self, points: &[SensorReading], policy: &str) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[
                ("db", self.database.as_str()),
                ("rp", policy),
                ("precision", "u"),
                ("u", self.username.as_str()),
                ("p", self.password.as_str()),
            ])
            .body(render_batch(points))
            .send()
            .await?;
        check_status("write", response).await?;

        debug!(policy, count = points.len(), "Points written");
        Ok(())
    }

    async fn ensure_database(&self, name: &str) -> Result<()> {
        self.query(&format!("CREATE DATABASE {}", quote_ident(name))).await?;
        info!(database = name, "Database ready");
        Ok(())
    }

    async fn ensure_retention_policy(&self, database: &str, policy: &RetentionPolicy) -> Result<()> {
        let existing = self.retention_policies(database).await?;
        if existing.iter().any(|name| name == &policy.name) {
            debug!(policy = %policy.name, ?existing, "Retention policy already present");
            return Ok(());
        }

        let statement = format!(
            "CREATE RETENTION POLICY {} ON {} DURATION {} REPLICATION {}",
            quote_ident(&policy.name),
            quote_ident(database),
            policy.duration,
            policy.replication
        );
        self.query(&statement).await?;
        info!(
            policy = %policy.name,
            duration = %policy.duration,
            replication = policy.replication,
            "Retention policy created"
        );
        Ok(())
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BridgeError::storage_status(operation, status.as_u16(), body.trim()))
}

/// First statement-level error in a `/query` response, if any.
fn statement_error(body: &Value) -> Option<String> {
    if let Some(err) = body.get("error").and_then(Value::as_str) {
        return Some(err.to_string());
    }
    body.get("results")?
        .as_array()?
        .iter()
        .find_map(|result| result.get("error").and_then(Value::as_str))
        .map(str::to_string)
}

/// Policy names from a `SHOW RETENTION POLICIES` response.
fn policy_names(body: &Value) -> Vec<String> {
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|result| result.get("series").and_then(Value::as_array))
        .flatten()
        .flat_map(|series| {
            let name_col = series
                .get("columns")
                .and_then(Value::as_array)
                .and_then(|cols| cols.iter().position(|c| c.as_str() == Some("name")))
                .unwrap_or(0);
            series
                .get("values")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(move |row| row.get(name_col).and_then(Value::as_str).map(str::to_string))
        })
        .collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}
