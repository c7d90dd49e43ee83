use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

use crate::detect::{AnomalyAlert, Severity};
use crate::storage::alerts;

/// Owns the in-memory feed of recent alerts.
///
/// Recording does no I/O. Raised alerts are written with [`persist`].
pub struct AlertManager {
    recent: Vec<AnomalyAlert>,
    /// In-memory horizon in seconds.
    memory_secs: f64,
}

/// Write a batch of raised alerts in one transaction.
pub fn persist(conn: &Connection, raised: &[AnomalyAlert]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for alert in raised {
        alerts::insert(&tx, alert)?;
    }
    tx.commit()?;
    Ok(())
}

impl AlertManager {
    pub fn new(memory_hours: u32) -> Self {
        Self {
            recent: Vec::new(),
            memory_secs: f64::from(memory_hours) * 3600.0,
        }
    }

    /// Add `alert` to the in-memory feed and drop entries older than the
    /// memory horizon.
    pub fn record(&mut self, alert: AnomalyAlert, now: f64) {
        warn!(
            severity = %alert.severity,
            alert_type = %alert.alert_type,
            "ANOMALY ALERT [{}]: {}",
            alert.severity.as_str().to_uppercase(),
            alert.description
        );

        self.recent.push(alert);
        let cutoff = now - self.memory_secs;
        self.recent.retain(|a| a.timestamp > cutoff);
    }

    /// In-memory alerts newer than `hours`, optionally of one severity.
    pub fn recent(&self, hours: f64, severity: Option<Severity>, now: f64) -> Vec<AnomalyAlert> {
        let cutoff = now - hours * 3600.0;
        self.recent
            .iter()
            .filter(|a| a.timestamp > cutoff)
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect()
    }

    /// Count in-memory alerts newer than `hours` matching `predicate`.
    pub fn count_where<F>(&self, hours: f64, now: f64, predicate: F) -> usize
    where
        F: Fn(&AnomalyAlert) -> bool,
    {
        let cutoff = now - hours * 3600.0;
        self.recent
            .iter()
            .filter(|a| a.timestamp > cutoff && predicate(a))
            .count()
    }
}
