use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BaselineConfig;
use crate::detect::stats::SampleStats;
use crate::storage::events::{self, StatusFilter};

/// Reference statistics the detectors treat as "normal".
///
/// Replaced as a whole on recompute, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub avg_processing_time: f64,
    pub std_processing_time: f64,
    pub avg_score: f64,
    pub std_score: f64,
    pub requests_per_hour: f64,
    pub last_updated: f64,
    /// Events the statistics were computed from; 0 for defaults.
    pub sample_count: usize,
}

impl BaselineMetrics {
    pub const DEFAULT_AVG_PROCESSING_TIME: f64 = 0.5;
    pub const DEFAULT_STD_PROCESSING_TIME: f64 = 0.2;
    pub const DEFAULT_AVG_SCORE: f64 = 500.0;
    pub const DEFAULT_STD_SCORE: f64 = 150.0;
    pub const DEFAULT_REQUESTS_PER_HOUR: f64 = 10.0;

    /// Baseline used when there is no history.
    pub fn defaults(now: f64) -> Self {
        Self {
            avg_processing_time: Self::DEFAULT_AVG_PROCESSING_TIME,
            std_processing_time: Self::DEFAULT_STD_PROCESSING_TIME,
            avg_score: Self::DEFAULT_AVG_SCORE,
            std_score: Self::DEFAULT_STD_SCORE,
            requests_per_hour: Self::DEFAULT_REQUESTS_PER_HOUR,
            last_updated: now,
            sample_count: 0,
        }
    }

    /// Build a baseline from `(processing_time, credit_score)` samples.
    ///
    /// `total_events` is the full event count over `history_days`; the hourly
    /// rate uses it even when `samples` was capped.
    pub fn from_samples(samples: &[(f64, Option<f64>)], total_events: u64, history_days: u32, now: f64) -> Self {
        if samples.is_empty() {
            return Self::defaults(now);
        }

        let latency = SampleStats::from_values(samples.iter().map(|(t, _)| *t));
        let scores = SampleStats::from_values(samples.iter().filter_map(|(_, s)| *s));

        let avg_score = if scores.is_empty() {
            Self::DEFAULT_AVG_SCORE
        } else {
            scores.mean
        };
        let std_score = if scores.count < 2 {
            Self::DEFAULT_STD_SCORE
        } else {
            scores.std_dev
        };

        Self {
            avg_processing_time: latency.mean,
            std_processing_time: latency.std_dev,
            avg_score,
            std_score,
            requests_per_hour: total_events as f64 / (f64::from(history_days.max(1)) * 24.0),
            last_updated: now,
            sample_count: latency.count,
        }
    }

    /// Latency stddev, never below `floor`.
    pub fn latency_std(&self, floor: f64) -> f64 {
        self.std_processing_time.max(floor)
    }

    /// Score stddev, never below `floor`.
    pub fn score_std(&self, floor: f64) -> f64 {
        self.std_score.max(floor)
    }
}

/// Compute a fresh baseline from the last `history_days` of persisted events.
pub fn compute(conn: &Connection, config: &BaselineConfig, now: f64) -> Result<BaselineMetrics> {
    let since = now - f64::from(config.history_days) * 24.0 * 3600.0;

    let samples = events::recent_samples(conn, since, config.sample_limit)
        .context("failed to load baseline samples")?;
    if samples.is_empty() {
        info!(history_days = config.history_days, "no scoring history, using default baseline");
        return Ok(BaselineMetrics::defaults(now));
    }

    let total = events::count(conn, Some(since), None, StatusFilter::Any)
        .context("failed to count baseline events")?;

    let baseline = BaselineMetrics::from_samples(&samples, total, config.history_days, now);
    info!(
        samples = baseline.sample_count,
        avg_processing_time = baseline.avg_processing_time,
        avg_score = baseline.avg_score,
        requests_per_hour = baseline.requests_per_hour,
        "baseline recomputed"
    );
    Ok(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ScoringEvent, ScoringRecord};
    use crate::storage::test_support::temp_pool;
    use serde_json::json;

    #[test]
    fn test_defaults_when_no_history() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let baseline = compute(&conn, &BaselineConfig::default(), 1_000_000.0).unwrap();
        assert_eq!(baseline, BaselineMetrics::defaults(1_000_000.0));
        assert_eq!(baseline.avg_processing_time, 0.5);
        assert_eq!(baseline.std_score, 150.0);
        assert_eq!(baseline.requests_per_hour, 10.0);
    }

    #[test]
    fn test_from_samples_uses_sample_std() {
        let samples = vec![(0.2, Some(600.0)), (0.4, Some(700.0)), (0.6, None)];
        let baseline = BaselineMetrics::from_samples(&samples, 3, 7, 5.0);
        assert!((baseline.avg_processing_time - 0.4).abs() < 1e-12);
        assert!((baseline.std_processing_time - 0.2).abs() < 1e-12);
        assert_eq!(baseline.avg_score, 650.0);
        assert!((baseline.std_score - 50f64 * 2f64.sqrt()).abs() < 1e-9);
        assert!((baseline.requests_per_hour - 3.0 / 168.0).abs() < 1e-12);
        assert_eq!(baseline.sample_count, 3);
    }

    #[test]
    fn test_single_sample_std_is_floored_on_use() {
        let baseline = BaselineMetrics::from_samples(&[(0.3, Some(640.0))], 1, 7, 0.0);
        assert_eq!(baseline.std_processing_time, 0.0);
        assert_eq!(baseline.latency_std(0.01), 0.01);
        // a lone score keeps its mean but cannot give a spread
        assert_eq!(baseline.avg_score, 640.0);
        assert_eq!(baseline.std_score, BaselineMetrics::DEFAULT_STD_SCORE);
    }

    #[test]
    fn test_compute_ignores_old_history_and_caps_samples() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let now = 10_000_000.0;
        let week = 7.0 * 24.0 * 3600.0;

        let record = |latency: f64, score: f64| ScoringRecord {
            user_id: "u".into(),
            api_key: "k".into(),
            response_payload: json!({"credit_score": score}).as_object().cloned().unwrap(),
            processing_time: latency,
            status_code: 200,
            ..Default::default()
        };

        // ancient outlier outside the history window
        events::insert(&conn, &ScoringEvent::at(now - week - 10.0, record(50.0, 10.0))).unwrap();
        for i in 0..4 {
            events::insert(&conn, &ScoringEvent::at(now - 100.0 + i as f64, record(1.0, 700.0))).unwrap();
        }

        let config = BaselineConfig {
            history_days: 7,
            sample_limit: 2,
        };
        let baseline = compute(&conn, &config, now).unwrap();
        assert_eq!(baseline.sample_count, 2);
        assert_eq!(baseline.avg_processing_time, 1.0);
        assert_eq!(baseline.avg_score, 700.0);
        assert!((baseline.requests_per_hour - 4.0 / 168.0).abs() < 1e-12);
    }
}
