//! Override rules and request history persistence.
//!
//! # Data Flow
//! ```text
//! Request Orchestrator
//!     → OverrideStore::find_by_endpoint_and_payload (exact strategy)
//!     → OverrideStore::find_by_substring_of_response (substring strategy)
//!     → HistorySink::record (after the response body is final)
//!
//! Admin API
//!     → OverrideStore::insert / list_all
//!     → HistorySink::list
//! ```
//!
//! # Design Decisions
//! - Rules are append-only; the highest id is the most recent rule
//! - The store serializes its own access; callers hold no locks
//! - Traits at this seam so the orchestrator can be tested with fakes

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::observability::metrics;
use crate::resilience::within;

pub use sqlite::SqliteStore;

/// A stored override directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRule {
    pub id: i64,
    pub endpoint_lookup: String,
    /// Empty or absent matches any payload for the endpoint.
    pub payload_lookup: Option<String>,
    /// Substring looked for in raw upstream bodies. Empty never matches.
    pub response_lookup: Option<String>,
    /// JSON document merged into (or replacing) the upstream response.
    pub response_override: String,
}

/// A rule as submitted for insertion; the store assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOverrideRule {
    #[serde(default)]
    pub endpoint_lookup: String,
    #[serde(default)]
    pub payload_lookup: Option<String>,
    #[serde(default)]
    pub response_lookup: Option<String>,
    pub response_override: String,
}

/// One proxied request as recorded by the history sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub timestamp: String,
    pub endpoint: String,
    pub payload: String,
    pub response: String,
}

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lookup and administration of override rules.
#[async_trait]
pub trait OverrideStore: Send + Sync {
    /// Most recent rule whose endpoint equals `endpoint` and whose payload lookup
    /// equals `payload` or is empty.
    async fn find_by_endpoint_and_payload(
        &self,
        endpoint: &str,
        payload: &str,
    ) -> StoreResult<Option<OverrideRule>>;

    /// Most recent rule whose non-empty response lookup occurs in `response_body`.
    async fn find_by_substring_of_response(
        &self,
        response_body: &str,
    ) -> StoreResult<Option<OverrideRule>>;

    /// Append a rule and return its id.
    async fn insert(&self, rule: NewOverrideRule) -> StoreResult<i64>;

    /// All rules in insertion order.
    async fn list_all(&self) -> StoreResult<Vec<OverrideRule>>;
}

/// Append-only log of proxied requests.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, endpoint: &str, payload: &str, response: &str) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<HistoryRecord>>;
}

/// Fire-and-log front for a [`HistorySink`]: bounded by a deadline, never fails the caller.
#[derive(Clone)]
pub struct HistoryRecorder {
    sink: Arc<dyn HistorySink>,
    deadline: Duration,
}

impl HistoryRecorder {
    pub fn new(sink: Arc<dyn HistorySink>, deadline: Duration) -> Self {
        Self { sink, deadline }
    }

    pub async fn record(&self, endpoint: &str, payload: &str, response: &[u8]) {
        let response = String::from_utf8_lossy(response);
        let error = match within(self.deadline, self.sink.record(endpoint, payload, &response)).await
        {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        metrics::record_history_failure();
        tracing::warn!(endpoint = %endpoint, error = %error, "Failed to record history");
    }
}
