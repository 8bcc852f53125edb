//! SQLite-backed override store and history sink.
//!
//! One connection guarded by a mutex; every statement runs on the blocking pool.
//! Insertions and lookups are therefore totally ordered, which makes "most recent
//! rule" (highest row id) well defined under concurrent requests.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::store::{
    HistoryRecord, HistorySink, NewOverrideRule, OverrideRule, OverrideStore, StoreError,
    StoreResult,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
        endpoint TEXT,
        payload TEXT,
        response TEXT
    );
    CREATE TABLE IF NOT EXISTS overrides (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        endpoint_lookup TEXT,
        payload_lookup TEXT,
        response_lookup TEXT,
        response_override TEXT
    );
"#;

const RULE_COLUMNS: &str =
    "id, endpoint_lookup, payload_lookup, response_lookup, response_override";

/// Shared handle to the proxy database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the tables exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// In-process database, discarded when the last handle drops.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard).map_err(StoreError::from)
        })
        .await?
    }
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<OverrideRule> {
    Ok(OverrideRule {
        id: row.get(0)?,
        endpoint_lookup: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        payload_lookup: row.get(2)?,
        response_lookup: row.get(3)?,
        response_override: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

#[async_trait]
impl OverrideStore for SqliteStore {
    async fn find_by_endpoint_and_payload(
        &self,
        endpoint: &str,
        payload: &str,
    ) -> StoreResult<Option<OverrideRule>> {
        let endpoint = endpoint.to_string();
        let payload = payload.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RULE_COLUMNS} FROM overrides
                     WHERE endpoint_lookup = ?1
                       AND (payload_lookup = ?2 OR payload_lookup IS NULL OR payload_lookup = '')
                     ORDER BY id DESC LIMIT 1"
                ),
                params![endpoint, payload],
                rule_from_row,
            )
            .optional()
        })
        .await
    }

    async fn find_by_substring_of_response(
        &self,
        response_body: &str,
    ) -> StoreResult<Option<OverrideRule>> {
        let body = response_body.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RULE_COLUMNS} FROM overrides
                     WHERE response_lookup IS NOT NULL
                       AND response_lookup <> ''
                       AND instr(?1, response_lookup) > 0
                     ORDER BY id DESC LIMIT 1"
                ),
                params![body],
                rule_from_row,
            )
            .optional()
        })
        .await
    }

    async fn insert(&self, rule: NewOverrideRule) -> StoreResult<i64> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO overrides (endpoint_lookup, payload_lookup, response_lookup, response_override)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    rule.endpoint_lookup,
                    rule.payload_lookup,
                    rule.response_lookup,
                    rule.response_override
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn list_all(&self) -> StoreResult<Vec<OverrideRule>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM overrides ORDER BY id"))?;
            let rules = stmt
                .query_map([], rule_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rules)
        })
        .await
    }
}

#[async_trait]
impl HistorySink for SqliteStore {
    async fn record(&self, endpoint: &str, payload: &str, response: &str) -> StoreResult<()> {
        let (endpoint, payload, response) =
            (endpoint.to_string(), payload.to_string(), response.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO requests (endpoint, payload, response) VALUES (?1, ?2, ?3)",
                params![endpoint, payload, response],
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<HistoryRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, endpoint, payload, response FROM requests ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(HistoryRecord {
                    id: row.get(0)?,
                    timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    endpoint: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    payload: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    response: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                })
            })?;
            let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}
