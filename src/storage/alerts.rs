//! Persistence for anomaly alerts.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::detect::{AlertType, AnomalyAlert, Severity};
use crate::storage::json_column;

const ALERT_COLUMNS: &str = "timestamp, alert_type, severity, description, \
     affected_entities_json, metrics_json, recommendations_json";

/// Insert a single alert, returning its row id.
///
/// Non-finite metrics have no JSON form and are left out of the stored copy.
pub fn insert(conn: &Connection, alert: &AnomalyAlert) -> Result<i64> {
    let entities = serde_json::to_string(&alert.affected_entities)?;
    let finite: BTreeMap<&str, f64> = alert
        .metrics
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    let metrics = serde_json::to_string(&finite)?;
    let recommendations = serde_json::to_string(&alert.recommendations)?;

    conn.execute(
        &format!("INSERT INTO anomaly_alerts ({ALERT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            alert.timestamp,
            alert.alert_type.as_str(),
            alert.severity.as_str(),
            alert.description,
            entities,
            metrics,
            recommendations,
        ],
    )
    .context("failed to insert anomaly alert")?;

    Ok(conn.last_insert_rowid())
}

/// Newest-first alerts with `timestamp > since` (and `<= until` when given).
pub fn query(
    conn: &Connection,
    since: f64,
    until: Option<f64>,
    severity: Option<Severity>,
    limit: usize,
) -> Result<Vec<AnomalyAlert>> {
    let mut clause = String::from("WHERE timestamp > ?");
    let mut values = vec![SqlValue::Real(since)];
    if let Some(until) = until {
        clause.push_str(" AND timestamp <= ?");
        values.push(SqlValue::Real(until));
    }
    if let Some(severity) = severity {
        clause.push_str(" AND severity = ?");
        values.push(SqlValue::Text(severity.as_str().to_string()));
    }
    values.push(SqlValue::Integer(limit as i64));

    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM anomaly_alerts {clause}
         ORDER BY timestamp DESC, id DESC LIMIT ?"
    ))?;
    let rows = stmt.query_map(params_from_iter(values), alert_from_row)?;

    let mut alerts = Vec::new();
    for r in rows {
        alerts.push(r?);
    }
    Ok(alerts)
}

/// All alerts with `start <= timestamp <= end`, oldest first.
pub fn range(conn: &Connection, start: f64, end: f64) -> Result<Vec<AnomalyAlert>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM anomaly_alerts
         WHERE timestamp BETWEEN ?1 AND ?2
         ORDER BY timestamp ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![start, end], alert_from_row)?;

    let mut alerts = Vec::new();
    for r in rows {
        alerts.push(r?);
    }
    Ok(alerts)
}

/// Delete alerts with `timestamp < cutoff`.
pub fn delete_before(conn: &Connection, cutoff: f64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM anomaly_alerts WHERE timestamp < ?1", params![cutoff])?;
    Ok(deleted)
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<AnomalyAlert> {
    let type_str: String = row.get(1)?;
    let alert_type = type_str
        .parse::<AlertType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let sev_str: String = row.get(2)?;
    let severity = sev_str
        .parse::<Severity>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(AnomalyAlert {
        timestamp: row.get(0)?,
        alert_type,
        severity,
        description: row.get(3)?,
        affected_entities: json_column(row, 4)?,
        metrics: json_column(row, 5)?,
        recommendations: json_column(row, 6)?,
    })
}
