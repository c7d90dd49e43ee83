//! TOML configuration for the scoring monitor.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working configuration. The config file path may come from
//! the command line, the `SCORING_MONITOR_CONFIG` environment variable or the
//! standard system location.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SCORING_MONITOR_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/scoring-monitor/monitor.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the monitor process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded monitor configuration");
        Ok(config)
    }

    /// Resolve the configuration in order:
    /// 1. `explicit` (from the command line); failure here is an error.
    /// 2. The path in `SCORING_MONITOR_CONFIG`.
    /// 3. `/etc/scoring-monitor/monitor.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "SCORING_MONITOR_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window.capacity == 0 {
            bail!("window.capacity must be at least 1");
        }
        let d = &self.detection;
        if d.score_high_sigma < d.score_medium_sigma {
            bail!(
                "detection.score_high_sigma ({}) is below score_medium_sigma ({})",
                d.score_high_sigma,
                d.score_medium_sigma
            );
        }
        if d.error_rate_critical < d.error_rate_high {
            bail!(
                "detection.error_rate_critical ({}) is below error_rate_high ({})",
                d.error_rate_critical,
                d.error_rate_high
            );
        }
        if d.min_latency_std <= 0.0 || d.min_score_std <= 0.0 {
            bail!("detection stddev floors must be positive");
        }
        if self.baseline.history_days == 0 {
            bail!("baseline.history_days must be at least 1");
        }
        for (name, expr) in [
            ("maintenance.baseline_cron", &self.maintenance.baseline_cron),
            ("maintenance.cleanup_cron", &self.maintenance.cleanup_cron),
        ] {
            cron::Schedule::from_str(expr)
                .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", name, expr, e))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; the parent directory is created on open.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/scoring_monitor.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sliding window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Capacity shared by the event, score and latency buffers.
    pub capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

// ---------------------------------------------------------------------------
// Detection thresholds
// ---------------------------------------------------------------------------

/// Thresholds used by the anomaly detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// No detector runs until the event window holds this many events.
    pub min_events: usize,
    pub latency_min_samples: usize,
    /// Latency spike fires above `avg + latency_sigma * std`.
    pub latency_sigma: f64,
    pub score_min_samples: usize,
    pub score_medium_sigma: f64,
    pub score_high_sigma: f64,
    /// Traffic spike fires when the trailing-hour count exceeds this multiple of the baseline rate.
    pub traffic_multiplier: f64,
    pub error_min_events: usize,
    pub error_rate_high: f64,
    pub error_rate_critical: f64,
    /// Lifetime requests per user before a repeat-request alert.
    pub user_request_limit: u64,
    /// Lifetime requests per source address before a repeat-request alert.
    pub address_request_limit: u64,
    /// Floor applied to the baseline latency stddev (seconds).
    pub min_latency_std: f64,
    /// Floor applied to the baseline score stddev.
    pub min_score_std: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_events: 10,
            latency_min_samples: 10,
            latency_sigma: 3.0,
            score_min_samples: 20,
            score_medium_sigma: 2.0,
            score_high_sigma: 3.0,
            traffic_multiplier: 5.0,
            error_min_events: 10,
            error_rate_high: 0.10,
            error_rate_critical: 0.30,
            user_request_limit: 50,
            address_request_limit: 100,
            min_latency_std: 0.01,
            min_score_std: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Baseline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Days of history the baseline is computed from.
    pub history_days: u32,
    /// Most recent events used for the mean/stddev statistics.
    pub sample_limit: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            history_days: 7,
            sample_limit: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Persisted records older than this are purged by scheduled cleanup.
    pub days_to_keep: u32,
    /// Horizon of the in-memory alert list.
    pub alert_memory_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days_to_keep: 90,
            alert_memory_hours: 24,
        }
    }
}

// ---------------------------------------------------------------------------
// Maintenance schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    /// Six-field cron expression (sec min hour dom mon dow).
    pub baseline_cron: String,
    pub cleanup_cron: String,
    pub poll_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline_cron: "0 0 3 * * *".to_string(),
            cleanup_cron: "0 30 3 * * *".to_string(),
            poll_interval_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Server and logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window.capacity, 1000);
        assert_eq!(config.detection.user_request_limit, 50);
        assert_eq!(config.retention.days_to_keep, 90);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(
            &path,
            "[window]\ncapacity = 50\n\n[detection]\nlatency_sigma = 4.0\n",
        )
        .unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.window.capacity, 50);
        assert_eq!(config.detection.latency_sigma, 4.0);
        assert_eq!(config.detection.score_min_samples, 20);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = MonitorConfig::default();
        config.detection.error_rate_critical = 0.05;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.window.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_cron() {
        let mut config = MonitorConfig::default();
        config.maintenance.cleanup_cron = "every day".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(MonitorConfig::resolve(Some(&missing)).is_err());
    }
}
