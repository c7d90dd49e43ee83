//! Anomaly detection over scoring traffic.
//!
//! Ingestion feeds the sliding [`window`], the [`detectors`] compare the
//! window with the learned [`baseline`], and the [`alerts`] manager keeps the
//! recent alert feed. [`engine::ScoringMonitor`] ties them together.

pub mod alerts;
pub mod baseline;
pub mod detectors;
pub mod engine;
pub mod stats;
pub mod window;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectError {
    #[error("unknown severity '{0}' (expected low, medium, high or critical)")]
    UnknownSeverity(String),
    #[error("unknown alert type '{0}'")]
    UnknownAlertType(String),
}

/// Severity levels for raised alerts, ordered low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DetectError::UnknownSeverity(s.to_string()))
    }
}

/// What kind of anomaly an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ResponseTimeSpike,
    ScoreDistributionShift,
    TrafficSpike,
    HighErrorRate,
    /// One user exceeded its request limit.
    RepeatUserRequests,
    /// One source address exceeded its request limit.
    RepeatAddressRequests,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::ResponseTimeSpike,
        AlertType::ScoreDistributionShift,
        AlertType::TrafficSpike,
        AlertType::HighErrorRate,
        AlertType::RepeatUserRequests,
        AlertType::RepeatAddressRequests,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::ResponseTimeSpike => "response_time_spike",
            AlertType::ScoreDistributionShift => "score_distribution_shift",
            AlertType::TrafficSpike => "traffic_spike",
            AlertType::HighErrorRate => "high_error_rate",
            AlertType::RepeatUserRequests => "repeat_user_requests",
            AlertType::RepeatAddressRequests => "repeat_address_requests",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DetectError::UnknownAlertType(s.to_string()))
    }
}

/// A raised anomaly with its evidence and suggested remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub timestamp: f64,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub description: String,
    pub affected_entities: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}
