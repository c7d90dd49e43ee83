//! Read models for the monitoring dashboard and health probe.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::analysis::snapshot::StatsSnapshot;
use crate::detect::{AnomalyAlert, Severity};
use crate::storage::events::{self, StatusFilter};

/// Hours covered by the dashboard charts.
pub const DASHBOARD_HOURS: usize = 24;
const TOP_API_KEYS: usize = 10;
const RECENT_ALERTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub timestamp: f64,
    pub database_accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_events: Option<u64>,
    pub monitoring_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthCheck {
    pub fn from_count(result: Result<u64>, now: f64) -> Self {
        match result {
            Ok(total) => Self {
                status: HealthStatus::Healthy,
                timestamp: now,
                database_accessible: true,
                total_events: Some(total),
                monitoring_active: true,
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                timestamp: now,
                database_accessible: false,
                total_events: None,
                monitoring_active: false,
                error: Some(format!("{e:#}")),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyBucket {
    /// Whole hours since the start of the chart window.
    pub hour_offset: usize,
    pub requests: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiKeyUsage {
    pub api_key: String,
    pub request_count: u64,
}

/// Alert totals over the dashboard window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardData {
    pub overview: StatsSnapshot,
    pub alert_counts: AlertCounts,
    /// The newest few alerts, newest first.
    pub recent_alerts: Vec<AnomalyAlert>,
    pub hourly: Vec<HourlyBucket>,
    pub top_api_keys: Vec<ApiKeyUsage>,
}

/// Summarise the alert feed for the dashboard: counts over all of `alerts`
/// and the newest few, newest first.
pub fn alert_panel(alerts: &[AnomalyAlert]) -> (AlertCounts, Vec<AnomalyAlert>) {
    let counts = AlertCounts {
        total: alerts.len(),
        critical: alerts.iter().filter(|a| a.severity == Severity::Critical).count(),
        high: alerts.iter().filter(|a| a.severity == Severity::High).count(),
    };

    // stable sort over the reversed feed keeps later raises first on ties
    let mut newest: Vec<AnomalyAlert> = alerts.iter().rev().cloned().collect();
    newest.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
    newest.truncate(RECENT_ALERTS);
    (counts, newest)
}

/// Persisted traffic charts for the trailing day.
pub struct TrafficCharts {
    pub hourly: Vec<HourlyBucket>,
    pub top_api_keys: Vec<ApiKeyUsage>,
}

/// Per-hour request/error counts (every hour present, zero-filled) and the busiest API keys.
///
/// Events at or after `now` land in the last bucket, so the chart totals
/// match the API key counts.
pub fn traffic_charts(conn: &Connection, now: f64) -> Result<TrafficCharts> {
    let start = now - DASHBOARD_HOURS as f64 * 3600.0;

    let mut hourly: Vec<HourlyBucket> = (0..DASHBOARD_HOURS)
        .map(|hour_offset| HourlyBucket {
            hour_offset,
            requests: 0,
            errors: 0,
        })
        .collect();

    let requests = events::hourly_counts(conn, start, StatusFilter::Any).context("failed to load hourly requests")?;
    let errors = events::hourly_counts(conn, start, StatusFilter::Errors).context("failed to load hourly errors")?;
    for (offset, n) in requests {
        hourly[chart_slot(offset)].requests += n;
    }
    for (offset, n) in errors {
        hourly[chart_slot(offset)].errors += n;
    }

    let top_api_keys = events::top_api_keys(conn, start, TOP_API_KEYS)
        .context("failed to load top api keys")?
        .into_iter()
        .map(|(api_key, request_count)| ApiKeyUsage { api_key, request_count })
        .collect();

    Ok(TrafficCharts { hourly, top_api_keys })
}

fn chart_slot(offset: i64) -> usize {
    usize::try_from(offset).unwrap_or(0).min(DASHBOARD_HOURS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::AlertType;
    use crate::event::{ScoringEvent, ScoringRecord};
    use crate::storage::test_support::temp_pool;
    use std::collections::BTreeMap;

    fn insert(conn: &Connection, ts: f64, key: &str, status: u16) {
        let record = ScoringRecord {
            user_id: "u".into(),
            api_key: key.into(),
            processing_time: 0.1,
            status_code: status,
            ..Default::default()
        };
        events::insert(conn, &ScoringEvent::at(ts, record)).unwrap();
    }

    #[test]
    fn test_traffic_charts_zero_fill() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let now = 1_000_000.0;
        let start = now - 24.0 * 3600.0;
        insert(&conn, start + 10.0, "alpha", 200);
        insert(&conn, start + 20.0, "alpha", 502);
        insert(&conn, now - 5.0, "beta", 200);
        // outside the chart window
        insert(&conn, start - 10.0, "gamma", 200);

        let charts = traffic_charts(&conn, now).unwrap();
        assert_eq!(charts.hourly.len(), 24);
        assert_eq!(charts.hourly[0].requests, 2);
        assert_eq!(charts.hourly[0].errors, 1);
        assert_eq!(charts.hourly[23].requests, 1);
        assert_eq!(charts.hourly[12].requests, 0);
        assert_eq!(charts.top_api_keys.len(), 2);
        assert_eq!(charts.top_api_keys[0].api_key, "alpha");
    }

    #[test]
    fn test_traffic_charts_keep_edge_events() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let now = 1_000_000.0;
        // exactly 24h after the window start, and an hour in the future
        insert(&conn, now, "alpha", 200);
        insert(&conn, now + 3600.0, "alpha", 500);
        insert(&conn, now - 60.0, "beta", 200);

        let charts = traffic_charts(&conn, now).unwrap();
        assert_eq!(charts.hourly.len(), DASHBOARD_HOURS);
        assert_eq!(charts.hourly[23].requests, 3);
        assert_eq!(charts.hourly[23].errors, 1);

        let charted: u64 = charts.hourly.iter().map(|b| b.requests).sum();
        let by_key: u64 = charts.top_api_keys.iter().map(|k| k.request_count).sum();
        assert_eq!(charted, by_key);
    }

    fn alert(ts: f64, severity: Severity) -> AnomalyAlert {
        AnomalyAlert {
            timestamp: ts,
            alert_type: AlertType::HighErrorRate,
            severity,
            description: "High error rate detected".into(),
            affected_entities: vec!["api_service".into()],
            metrics: BTreeMap::new(),
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn test_alert_panel_counts_all_and_shows_newest_five() {
        let severities = [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::High,
            Severity::Low,
            Severity::Critical,
            Severity::High,
        ];
        let feed: Vec<AnomalyAlert> = severities
            .iter()
            .enumerate()
            .map(|(i, s)| alert(100.0 + i as f64, *s))
            .collect();

        let (counts, newest) = alert_panel(&feed);
        assert_eq!(
            counts,
            AlertCounts {
                total: 7,
                critical: 2,
                high: 3,
            }
        );
        let stamps: Vec<f64> = newest.iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![106.0, 105.0, 104.0, 103.0, 102.0]);

        let (empty, none) = alert_panel(&[]);
        assert_eq!(empty, AlertCounts::default());
        assert!(none.is_empty());
    }

    #[test]
    fn test_health_check_reports_failure() {
        let healthy = HealthCheck::from_count(Ok(3), 1.0);
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.total_events, Some(3));

        let broken = HealthCheck::from_count(Err(anyhow::anyhow!("disk gone")), 1.0);
        assert_eq!(broken.status, HealthStatus::Unhealthy);
        assert!(!broken.database_accessible);
        assert_eq!(broken.error.as_deref(), Some("disk gone"));
    }
}
