//! The anomaly detectors run on every ingested event.
//!
//! Each detector is a pure function of the window, the baseline and the
//! triggering event. They run in a fixed order and each emits at most one
//! alert.

use std::collections::BTreeMap;

use crate::config::DetectionConfig;
use crate::detect::baseline::BaselineMetrics;
use crate::detect::stats;
use crate::detect::window::SlidingWindow;
use crate::detect::{AlertType, AnomalyAlert, Severity};
use crate::event::ScoringEvent;

const HOUR: f64 = 3600.0;

/// Everything a detector may look at.
pub struct DetectionContext<'a> {
    pub window: &'a SlidingWindow,
    pub baseline: &'a BaselineMetrics,
    pub event: &'a ScoringEvent,
    pub now: f64,
    pub thresholds: &'a DetectionConfig,
}

pub type Detector = fn(&DetectionContext<'_>) -> Option<AnomalyAlert>;

/// Detectors in evaluation order.
pub const DETECTORS: [Detector; 6] = [
    response_time_spike,
    score_distribution_shift,
    traffic_spike,
    high_error_rate,
    repeat_user_requests,
    repeat_address_requests,
];

/// Run every detector against the current window.
///
/// Nothing fires until the event window holds `thresholds.min_events`
/// events, so a cold start does not produce noise.
pub fn run_all(ctx: &DetectionContext<'_>) -> Vec<AnomalyAlert> {
    if ctx.window.events().len() < ctx.thresholds.min_events {
        return Vec::new();
    }
    DETECTORS.iter().filter_map(|detect| detect(ctx)).collect()
}

fn alert(
    ctx: &DetectionContext<'_>,
    alert_type: AlertType,
    severity: Severity,
    description: String,
    affected_entities: Vec<String>,
    metrics: &[(&str, f64)],
    recommendations: &[&str],
) -> AnomalyAlert {
    AnomalyAlert {
        timestamp: ctx.now,
        alert_type,
        severity,
        description,
        affected_entities,
        metrics: metrics
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>(),
        recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
    }
}

/// Guarded ratio for "spike factor" evidence.
fn ratio(value: f64, reference: f64) -> f64 {
    if reference > f64::EPSILON {
        value / reference
    } else {
        0.0
    }
}

/// Mean window latency above `avg + sigma * std` of the baseline.
pub fn response_time_spike(ctx: &DetectionContext<'_>) -> Option<AnomalyAlert> {
    let latencies = ctx.window.latencies();
    if latencies.len() < ctx.thresholds.latency_min_samples {
        return None;
    }

    let avg = stats::mean(latencies.iter().copied())?;
    let baseline_avg = ctx.baseline.avg_processing_time;
    let std = ctx.baseline.latency_std(ctx.thresholds.min_latency_std);
    if avg <= baseline_avg + ctx.thresholds.latency_sigma * std {
        return None;
    }

    Some(alert(
        ctx,
        AlertType::ResponseTimeSpike,
        Severity::High,
        format!("Response time spike detected: {avg:.3}s (baseline: {baseline_avg:.3}s)"),
        vec![ctx.event.api_key.clone()],
        &[
            ("current_avg_time", avg),
            ("baseline_avg_time", baseline_avg),
            ("spike_factor", ratio(avg, baseline_avg)),
        ],
        &[
            "Check system resources and database performance",
            "Review recent model changes",
            "Consider scaling infrastructure",
        ],
    ))
}

/// Mean window score drifting away from the baseline score.
///
/// Medium beyond `score_medium_sigma` deviations, high beyond `score_high_sigma`.
pub fn score_distribution_shift(ctx: &DetectionContext<'_>) -> Option<AnomalyAlert> {
    let scores = ctx.window.scores();
    if scores.len() < ctx.thresholds.score_min_samples {
        return None;
    }

    let avg = stats::mean(scores.iter().copied())?;
    let baseline_avg = ctx.baseline.avg_score;
    let std = ctx.baseline.score_std(ctx.thresholds.min_score_std);
    let deviation = (avg - baseline_avg).abs();
    if deviation <= ctx.thresholds.score_medium_sigma * std {
        return None;
    }
    let severity = if deviation > ctx.thresholds.score_high_sigma * std {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(alert(
        ctx,
        AlertType::ScoreDistributionShift,
        severity,
        format!("Score distribution shift: {avg:.0} (baseline: {baseline_avg:.0})"),
        vec!["scoring_model".to_string()],
        &[
            ("current_avg_score", avg),
            ("baseline_avg_score", baseline_avg),
            ("deviation", deviation),
        ],
        &[
            "Review model performance and training data",
            "Check for data quality issues",
            "Consider model retraining",
        ],
    ))
}

/// Trailing-hour request count above `traffic_multiplier` times the baseline rate.
pub fn traffic_spike(ctx: &DetectionContext<'_>) -> Option<AnomalyAlert> {
    let current = ctx.window.events_since(ctx.now - HOUR).count() as f64;
    let baseline_rate = ctx.baseline.requests_per_hour;
    if current <= baseline_rate * ctx.thresholds.traffic_multiplier {
        return None;
    }

    Some(alert(
        ctx,
        AlertType::TrafficSpike,
        Severity::Medium,
        format!("Traffic spike detected: {current} req/hour (baseline: {baseline_rate:.1})"),
        vec!["api_gateway".to_string()],
        &[
            ("current_rate", current),
            ("baseline_rate", baseline_rate),
            ("spike_factor", ratio(current, baseline_rate)),
        ],
        &[
            "Monitor system capacity",
            "Check for potential DDoS or bot activity",
            "Consider rate limiting adjustments",
        ],
    ))
}

/// Share of failed requests (status >= 400) over the trailing hour.
pub fn high_error_rate(ctx: &DetectionContext<'_>) -> Option<AnomalyAlert> {
    let (total, errors) = ctx
        .window
        .events_since(ctx.now - HOUR)
        .fold((0usize, 0usize), |(n, errs), e| (n + 1, errs + usize::from(e.is_error())));
    if total < ctx.thresholds.error_min_events {
        return None;
    }

    let error_rate = errors as f64 / total as f64;
    if error_rate <= ctx.thresholds.error_rate_high {
        return None;
    }
    let severity = if error_rate > ctx.thresholds.error_rate_critical {
        Severity::Critical
    } else {
        Severity::High
    };

    Some(alert(
        ctx,
        AlertType::HighErrorRate,
        severity,
        format!("High error rate detected: {:.1}%", error_rate * 100.0),
        vec!["api_service".to_string()],
        &[
            ("error_rate", error_rate),
            ("total_requests", total as f64),
            ("error_requests", errors as f64),
        ],
        &[
            "Check application logs for error details",
            "Review recent deployments",
            "Monitor system health",
        ],
    ))
}

/// The triggering user has exceeded its lifetime request limit.
pub fn repeat_user_requests(ctx: &DetectionContext<'_>) -> Option<AnomalyAlert> {
    let user_id = &ctx.event.user_id;
    let count = ctx.window.user_count(user_id);
    let limit = ctx.thresholds.user_request_limit;
    if count <= limit {
        return None;
    }

    Some(alert(
        ctx,
        AlertType::RepeatUserRequests,
        Severity::Medium,
        format!("User {user_id} has made {count} requests"),
        vec![user_id.clone()],
        &[("request_count", count as f64), ("limit", limit as f64)],
        &[
            "Review user behavior patterns",
            "Consider implementing user-specific rate limits",
            "Check for potential abuse",
        ],
    ))
}

/// The triggering source address has exceeded its lifetime request limit.
pub fn repeat_address_requests(ctx: &DetectionContext<'_>) -> Option<AnomalyAlert> {
    let address = &ctx.event.source_address;
    let count = ctx.window.address_count(address);
    let limit = ctx.thresholds.address_request_limit;
    if count <= limit {
        return None;
    }

    Some(alert(
        ctx,
        AlertType::RepeatAddressRequests,
        Severity::High,
        format!("Address {address} has made {count} requests"),
        vec![address.clone()],
        &[("request_count", count as f64), ("limit", limit as f64)],
        &[
            "Implement address-based rate limiting",
            "Check for bot or scraping activity",
            "Consider blocking suspicious addresses",
        ],
    ))
}
