//! Weekly aggregate report over persisted events and alerts.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::detect::stats::{self, SampleStats};
use crate::detect::{AnomalyAlert, Severity};
use crate::event::ScoringEvent;
use crate::storage::{alerts, events};

/// Days covered by the weekly summary.
pub const SUMMARY_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub period: Period,
    pub volume_metrics: VolumeMetrics,
    pub performance_metrics: PerformanceMetrics,
    pub scoring_metrics: ScoringMetrics,
    pub anomaly_summary: AnomalySummary,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    pub start_date: String,
    pub end_date: String,
    pub duration_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeMetrics {
    pub total_requests: usize,
    pub daily_average: f64,
    pub unique_users: usize,
    /// Distinct API keys.
    pub unique_partners: usize,
    pub requests_per_user: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub avg_response_time: f64,
    pub p95_response_time: f64,
    pub error_rate: f64,
    /// Successful requests as a percentage of all requests.
    pub uptime_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringMetrics {
    pub total_scores_generated: usize,
    pub avg_credit_score: f64,
    pub score_distribution: ScoreDistribution,
}

/// Credit-score bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreDistribution {
    /// below 580
    pub poor: usize,
    /// 580 to 669
    pub fair: usize,
    /// 670 to 739
    pub good: usize,
    /// 740 to 799
    pub very_good: usize,
    /// 800 and above
    pub excellent: usize,
}

impl ScoreDistribution {
    pub fn from_scores(scores: &[f64]) -> Self {
        let mut dist = Self::default();
        for &score in scores {
            if score < 580.0 {
                dist.poor += 1;
            } else if score < 670.0 {
                dist.fair += 1;
            } else if score < 740.0 {
                dist.good += 1;
            } else if score < 800.0 {
                dist.very_good += 1;
            } else {
                dist.excellent += 1;
            }
        }
        dist
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalySummary {
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub high_alerts: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub alert_types: BTreeMap<String, usize>,
}

/// Query the trailing seven days and build the report.
pub fn weekly_summary(conn: &Connection, now: f64) -> Result<SummaryReport> {
    let start = now - f64::from(SUMMARY_DAYS) * 24.0 * 3600.0;
    let events = events::range(conn, start, now).context("failed to load weekly events")?;
    let alerts = alerts::range(conn, start, now).context("failed to load weekly alerts")?;
    Ok(build_summary(&events, &alerts, start, now))
}

/// Aggregate already-loaded events and alerts into a report.
pub fn build_summary(events: &[ScoringEvent], alerts: &[AnomalyAlert], start: f64, end: f64) -> SummaryReport {
    let total = events.len();
    let unique_users = events.iter().map(|e| e.user_id.as_str()).collect::<HashSet<_>>().len();
    let unique_partners = events.iter().map(|e| e.api_key.as_str()).collect::<HashSet<_>>().len();
    let errors = events.iter().filter(|e| e.is_error()).count();

    let latencies: Vec<f64> = events.iter().map(|e| e.processing_time).collect();
    let scores: Vec<f64> = events.iter().filter_map(ScoringEvent::credit_score).collect();
    let latency = SampleStats::from_values(latencies.iter().copied());
    let score = SampleStats::from_values(scores.iter().copied());

    let error_rate = if total > 0 { errors as f64 / total as f64 } else { 0.0 };

    let volume_metrics = VolumeMetrics {
        total_requests: total,
        daily_average: total as f64 / f64::from(SUMMARY_DAYS),
        unique_users,
        unique_partners,
        requests_per_user: if unique_users > 0 {
            total as f64 / unique_users as f64
        } else {
            0.0
        },
    };

    let performance_metrics = PerformanceMetrics {
        avg_response_time: latency.mean,
        p95_response_time: stats::percentile(&latencies, 95.0),
        error_rate,
        uptime_percentage: if total > 0 {
            (total - errors) as f64 / total as f64 * 100.0
        } else {
            100.0
        },
    };

    let scoring_metrics = ScoringMetrics {
        total_scores_generated: scores.len(),
        avg_credit_score: score.mean,
        score_distribution: ScoreDistribution::from_scores(&scores),
    };

    let mut by_severity: BTreeMap<Severity, usize> = Severity::ALL.into_iter().map(|s| (s, 0)).collect();
    let mut alert_types: BTreeMap<String, usize> = BTreeMap::new();
    for alert in alerts {
        *by_severity.entry(alert.severity).or_insert(0) += 1;
        *alert_types.entry(alert.alert_type.to_string()).or_insert(0) += 1;
    }
    let anomaly_summary = AnomalySummary {
        total_alerts: alerts.len(),
        critical_alerts: by_severity[&Severity::Critical],
        high_alerts: by_severity[&Severity::High],
        by_severity,
        alert_types,
    };

    let recommendations = recommend(total, &latency, error_rate, alerts.len(), &score);

    SummaryReport {
        period: Period {
            start_date: iso8601(start),
            end_date: iso8601(end),
            duration_days: SUMMARY_DAYS,
        },
        volume_metrics,
        performance_metrics,
        scoring_metrics,
        anomaly_summary,
        recommendations,
    }
}

fn recommend(total: usize, latency: &SampleStats, error_rate: f64, alert_count: usize, score: &SampleStats) -> Vec<String> {
    let mut out = Vec::new();

    if !latency.is_empty() && latency.mean > 1.0 {
        out.push("Consider optimizing API performance - average response time exceeds 1 second".to_string());
    }
    if total > 10_000 {
        out.push("High volume detected - consider implementing caching and load balancing".to_string());
    }
    if total > 0 && error_rate > 0.05 {
        out.push("Error rate above 5% - review error logs and improve error handling".to_string());
    }
    if alert_count > 20 {
        out.push("High number of alerts - review alert thresholds and system stability".to_string());
    }
    if !score.is_empty() {
        if score.mean < 400.0 {
            out.push("Low average credit scores - review model performance and training data".to_string());
        } else if score.mean > 800.0 {
            out.push("High average credit scores - validate model accuracy and potential bias".to_string());
        }
    }

    if out.is_empty() {
        out.push("System performing well - continue monitoring".to_string());
    }
    out
}

fn iso8601(ts: f64) -> String {
    let micros = (ts * 1_000_000.0).round() as i64;
    chrono::DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
