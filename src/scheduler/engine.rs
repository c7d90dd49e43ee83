use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::detect::engine::ScoringMonitor;
use crate::scheduler::{MaintenanceSchedule, MaintenanceTask};

/// Main maintenance loop.
/// Polls the schedule every `maintenance.poll_interval_secs` and runs due jobs
/// in order. Job failures are logged and the loop keeps going.
pub async fn run_maintenance_loop(monitor: Arc<ScoringMonitor>, mut schedule: MaintenanceSchedule) {
    let poll = Duration::from_secs(monitor.config().maintenance.poll_interval_secs.max(1));
    info!(
        next_baseline = ?schedule.next_run(MaintenanceTask::RecomputeBaseline),
        next_cleanup = ?schedule.next_run(MaintenanceTask::Cleanup),
        "Maintenance scheduler started"
    );

    let mut interval = tokio::time::interval(poll);
    loop {
        interval.tick().await;
        for task in schedule.due(Utc::now()) {
            info!(%task, "Maintenance task due");
            run_task(&monitor, task).await;
        }
    }
}

/// Run one maintenance job against the monitor.
pub async fn run_task(monitor: &ScoringMonitor, task: MaintenanceTask) {
    match task {
        MaintenanceTask::RecomputeBaseline => {
            if let Err(e) = monitor.recompute_baseline().await {
                error!(%task, "Baseline recompute failed: {:#}", e);
            }
        }
        MaintenanceTask::Cleanup => {
            let days = monitor.config().retention.days_to_keep;
            if let Err(e) = monitor.cleanup(days).await {
                error!(%task, days_to_keep = days, "Cleanup failed: {:#}", e);
            }
        }
    }
}
