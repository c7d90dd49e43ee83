use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::analysis::dashboard::{self, DashboardData, HealthCheck, DASHBOARD_HOURS};
use crate::analysis::snapshot::{CurrentMetrics, StatsSnapshot, SystemHealth};
use crate::analysis::summary::{self, SummaryReport};
use crate::config::MonitorConfig;
use crate::detect::alerts::{self as alert_feed, AlertManager};
use crate::detect::baseline::{self, BaselineMetrics};
use crate::detect::detectors::{self, DetectionContext};
use crate::detect::window::SlidingWindow;
use crate::detect::{AnomalyAlert, Severity};
use crate::event::{unix_now, ScoringEvent, ScoringRecord};
use crate::storage::events::{self, EventFilter, StatusFilter};
use crate::storage::{self, alerts, CleanupReport, Pool};

/// Mutable state guarded by a single lock: one ingestion call appends,
/// evaluates every detector and records its alerts without interleaving.
struct MonitorState {
    window: SlidingWindow,
    alerts: AlertManager,
}

/// The scoring monitor. Construct once at startup and share behind an `Arc`.
pub struct ScoringMonitor {
    pool: Pool,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    baseline: RwLock<BaselineMetrics>,
}

impl ScoringMonitor {
    /// Open the configured database and compute the initial baseline.
    pub async fn open(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let db_path = config.storage.db_path.clone();
        info!(db_path = %db_path.display(), "Initializing database");
        let pool = tokio::task::spawn_blocking(move || storage::open_pool(&db_path))
            .await
            .context("database open task failed")??;
        Ok(Self::with_pool(pool, config).await)
    }

    /// Build a monitor over an already-migrated pool.
    ///
    /// A failing baseline query is logged and the default baseline is used.
    pub async fn with_pool(pool: Pool, config: MonitorConfig) -> Self {
        let state = MonitorState {
            window: SlidingWindow::new(config.window.capacity),
            alerts: AlertManager::new(config.retention.alert_memory_hours),
        };
        let monitor = Self {
            pool,
            state: Mutex::new(state),
            baseline: RwLock::new(BaselineMetrics::defaults(unix_now())),
            config,
        };
        if let Err(e) = monitor.recompute_baseline().await {
            error!(error = %e, "failed to load baseline metrics, using defaults");
        }
        monitor
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run blocking storage work off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().context("failed to get database connection")?;
            f(&conn)
        })
        .await
        .context("storage task failed")?
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Record one scored request and run detection. Never fails; internal
    /// errors are logged. Returns the alerts this call raised.
    pub async fn ingest(&self, record: ScoringRecord) -> Vec<AnomalyAlert> {
        self.ingest_event(ScoringEvent::from_record(record)).await
    }

    /// Like [`ingest`](Self::ingest) for an already-timestamped event.
    ///
    /// Storage writes run on the blocking pool and never under the state
    /// lock, so a slow or exhausted database delays only this call.
    pub async fn ingest_event(&self, event: ScoringEvent) -> Vec<AnomalyAlert> {
        let stored = event.clone();
        if let Err(e) = self.with_conn(move |conn| events::insert(conn, &stored)).await {
            error!(user_id = %event.user_id, error = %e, "failed to persist scoring event");
        }

        let raised = {
            let mut state = self.state.lock().await;
            let now = unix_now();
            state.window.append(event);

            let raised = {
                let baseline = self.baseline.read().await;
                let Some(trigger) = state.window.events().newest() else {
                    return Vec::new();
                };
                let ctx = DetectionContext {
                    window: &state.window,
                    baseline: &baseline,
                    event: trigger,
                    now,
                    thresholds: &self.config.detection,
                };
                detectors::run_all(&ctx)
            };

            for alert in &raised {
                state.alerts.record(alert.clone(), now);
            }
            raised
        };

        if !raised.is_empty() {
            debug!(count = raised.len(), "ingestion raised alerts");
            let batch = raised.clone();
            if let Err(e) = self.with_conn(move |conn| alert_feed::persist(conn, &batch)).await {
                error!(count = raised.len(), error = %e, "failed to persist alerts");
            }
        }
        raised
    }

    // -----------------------------------------------------------------------
    // Baseline
    // -----------------------------------------------------------------------

    pub async fn baseline(&self) -> BaselineMetrics {
        self.baseline.read().await.clone()
    }

    /// Recompute the baseline from persisted history and swap it in.
    ///
    /// On a storage error the previous baseline stays in place.
    pub async fn recompute_baseline(&self) -> Result<BaselineMetrics> {
        let config = self.config.baseline.clone();
        let fresh = self
            .with_conn(move |conn| baseline::compute(conn, &config, unix_now()))
            .await?;
        *self.baseline.write().await = fresh.clone();
        Ok(fresh)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Engine health from the in-memory window and alert feed.
    pub async fn current_stats(&self) -> StatsSnapshot {
        let baseline = self.baseline().await;
        let state = self.state.lock().await;
        let now = unix_now();
        let snap = state.window.snapshot(now);

        let critical = state
            .alerts
            .count_where(1.0, now, |a| a.severity == Severity::Critical);
        let high = state.alerts.count_where(1.0, now, |a| a.severity == Severity::High);
        let total = state.alerts.count_where(1.0, now, |_| true);

        StatsSnapshot {
            timestamp: now,
            total_events_tracked: snap.events,
            events_last_hour: snap.events_last_hour,
            baseline_metrics: baseline,
            current_metrics: CurrentMetrics::from(&snap),
            alerts_last_24h: state.alerts.count_where(24.0, now, |_| true),
            system_health: SystemHealth::classify(critical, high, total),
        }
    }

    /// In-memory alerts from the last `hours`, optionally of one severity.
    pub async fn recent_alerts(&self, hours: f64, severity: Option<Severity>) -> Vec<AnomalyAlert> {
        let state = self.state.lock().await;
        state.alerts.recent(hours, severity, unix_now())
    }

    /// Persisted alerts, newest first. Unlike [`recent_alerts`](Self::recent_alerts)
    /// this reaches past the in-memory horizon.
    pub async fn query_alerts(
        &self,
        since: f64,
        until: Option<f64>,
        severity: Option<Severity>,
        limit: usize,
    ) -> Result<Vec<AnomalyAlert>> {
        self.with_conn(move |conn| alerts::query(conn, since, until, severity, limit))
            .await
    }

    /// Persisted events matching `filter`, newest first.
    pub async fn query_events(&self, filter: EventFilter, limit: usize, offset: usize) -> Result<Vec<ScoringEvent>> {
        self.with_conn(move |conn| events::query(conn, &filter, limit, offset))
            .await
    }

    /// Persisted events in `[start, end]` (either bound optional) matching `status`.
    pub async fn count_events(&self, start: Option<f64>, end: Option<f64>, status: StatusFilter) -> Result<u64> {
        self.with_conn(move |conn| events::count(conn, start, end, status))
            .await
    }

    pub async fn weekly_summary(&self) -> Result<SummaryReport> {
        self.with_conn(|conn| summary::weekly_summary(conn, unix_now()))
            .await
    }

    pub async fn health_check(&self) -> HealthCheck {
        let total = self.count_events(None, None, StatusFilter::Any).await;
        HealthCheck::from_count(total, unix_now())
    }

    pub async fn dashboard_data(&self) -> Result<DashboardData> {
        let now = unix_now();
        let charts = self
            .with_conn(move |conn| dashboard::traffic_charts(conn, now))
            .await?;
        let feed = self.recent_alerts(DASHBOARD_HOURS as f64, None).await;
        let (alert_counts, recent_alerts) = dashboard::alert_panel(&feed);
        Ok(DashboardData {
            overview: self.current_stats().await,
            alert_counts,
            recent_alerts,
            hourly: charts.hourly,
            top_api_keys: charts.top_api_keys,
        })
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Delete persisted events and alerts older than `days_to_keep` days.
    pub async fn cleanup(&self, days_to_keep: u32) -> Result<CleanupReport> {
        let cutoff = unix_now() - f64::from(days_to_keep) * 24.0 * 3600.0;
        let pool = self.pool.clone();
        let report = tokio::task::spawn_blocking(move || storage::purge_before(&pool, cutoff))
            .await
            .context("cleanup task failed")??;
        info!(
            days_to_keep,
            events_deleted = report.events_deleted,
            alerts_deleted = report.alerts_deleted,
            "Cleanup completed"
        );
        Ok(report)
    }
}
