//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS scoring_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp REAL NOT NULL,
            user_id TEXT NOT NULL,
            api_key TEXT NOT NULL,
            request_json TEXT NOT NULL,
            response_json TEXT NOT NULL,
            processing_time REAL NOT NULL,
            source_address TEXT NOT NULL,
            client_agent TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS anomaly_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp REAL NOT NULL,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            description TEXT NOT NULL,
            affected_entities_json TEXT NOT NULL,
            metrics_json TEXT NOT NULL,
            recommendations_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON scoring_events(timestamp);
        CREATE INDEX IF NOT EXISTS idx_events_user_id ON scoring_events(user_id);
        CREATE INDEX IF NOT EXISTS idx_events_api_key ON scoring_events(api_key);
        CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON anomaly_alerts(timestamp);
        CREATE INDEX IF NOT EXISTS idx_alerts_severity ON anomaly_alerts(severity);

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);",
    )?;

    Ok(())
}
