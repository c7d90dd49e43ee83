//! Point-in-time engine health.

use serde::Serialize;

use crate::detect::baseline::BaselineMetrics;
use crate::detect::window::WindowSnapshot;

/// Overall health derived from the last hour of alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl SystemHealth {
    /// Alert volume in the last hour above which the system is in `Warning`.
    pub const WARNING_ALERT_COUNT: usize = 5;

    /// Critical beats high beats volume; otherwise healthy.
    pub fn classify(critical_last_hour: usize, high_last_hour: usize, total_last_hour: usize) -> Self {
        if critical_last_hour > 0 {
            SystemHealth::Critical
        } else if high_last_hour > 0 {
            SystemHealth::Degraded
        } else if total_last_hour > Self::WARNING_ALERT_COUNT {
            SystemHealth::Warning
        } else {
            SystemHealth::Healthy
        }
    }
}

/// Averages over the current sliding window; absent when the window has no data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
}

impl From<&WindowSnapshot> for CurrentMetrics {
    fn from(snap: &WindowSnapshot) -> Self {
        let latency = (!snap.latency.is_empty()).then_some(snap.latency);
        let score = (!snap.score.is_empty()).then_some(snap.score);
        Self {
            avg_response_time: latency.map(|l| l.mean),
            max_response_time: latency.map(|l| l.max),
            avg_score: score.map(|s| s.mean),
            score_std: score.map(|s| s.std_dev),
            error_rate: (snap.events_last_hour > 0)
                .then(|| snap.errors_last_hour as f64 / snap.events_last_hour as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub timestamp: f64,
    pub total_events_tracked: usize,
    pub events_last_hour: usize,
    pub baseline_metrics: BaselineMetrics,
    pub current_metrics: CurrentMetrics,
    pub alerts_last_24h: usize,
    pub system_health: SystemHealth,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::stats::SampleStats;

    #[test]
    fn test_health_precedence() {
        assert_eq!(SystemHealth::classify(1, 3, 10), SystemHealth::Critical);
        assert_eq!(SystemHealth::classify(0, 1, 10), SystemHealth::Degraded);
        assert_eq!(SystemHealth::classify(0, 0, 6), SystemHealth::Warning);
        assert_eq!(SystemHealth::classify(0, 0, 5), SystemHealth::Healthy);
        assert_eq!(SystemHealth::classify(0, 0, 0), SystemHealth::Healthy);
    }

    #[test]
    fn test_current_metrics_from_empty_window() {
        let snap = WindowSnapshot {
            events: 0,
            latency: SampleStats::default(),
            score: SampleStats::default(),
            events_last_hour: 0,
            errors_last_hour: 0,
        };
        assert_eq!(CurrentMetrics::from(&snap), CurrentMetrics::default());
    }

    #[test]
    fn test_current_metrics_error_rate() {
        let snap = WindowSnapshot {
            events: 4,
            latency: SampleStats::from_values([0.1, 0.3]),
            score: SampleStats::default(),
            events_last_hour: 4,
            errors_last_hour: 1,
        };
        let metrics = CurrentMetrics::from(&snap);
        assert_eq!(metrics.error_rate, Some(0.25));
        assert_eq!(metrics.max_response_time, Some(0.3));
        assert_eq!(metrics.avg_score, None);
    }
}
