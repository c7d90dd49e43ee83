//! SQLite storage layer -- schema, event and alert persistence, retention.

pub mod alerts;
pub mod events;
pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory: {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database: {}", path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Decode a JSON text column. Malformed content is a conversion failure
/// on that column, not an empty value.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Outcome of a retention purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CleanupReport {
    pub events_deleted: usize,
    pub alerts_deleted: usize,
}

/// Delete events and alerts with `timestamp < cutoff`.
///
/// Both deletes are predicate-bounded, so this is safe to run while
/// ingestion keeps inserting fresh rows.
pub fn purge_before(pool: &Pool, cutoff: f64) -> Result<CleanupReport> {
    let conn = pool.get()?;
    let events_deleted = events::delete_before(&conn, cutoff).context("failed to purge events")?;
    let alerts_deleted = alerts::delete_before(&conn, cutoff).context("failed to purge alerts")?;
    Ok(CleanupReport {
        events_deleted,
        alerts_deleted,
    })
}
