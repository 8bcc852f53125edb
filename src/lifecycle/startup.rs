//! Startup helpers.
//!
//! # Responsibilities
//! - Write the PID file when configured
//! - Open the override/history database when enabled
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::path::Path;

use crate::config::DatabaseConfig;
use crate::store::{SqliteStore, StoreResult};

/// Write the current process ID to `path`, replacing any previous content.
pub fn write_pid_file(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    std::fs::write(path, std::process::id().to_string())?;
    tracing::info!(path = %path.display(), pid = std::process::id(), "PID file written");
    Ok(())
}

/// Open the database, or `None` when persistence is disabled.
pub fn open_store(config: &DatabaseConfig) -> StoreResult<Option<SqliteStore>> {
    if !config.enabled {
        tracing::info!("Database disabled: no overrides, history or admin API");
        return Ok(None);
    }
    let store = SqliteStore::open(&config.path)?;
    tracing::info!(path = %config.path, "Database opened");
    Ok(Some(store))
}
