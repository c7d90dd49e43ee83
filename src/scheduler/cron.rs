use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

use crate::config::MaintenanceConfig;

/// Periodic maintenance jobs run by the background loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTask {
    RecomputeBaseline,
    Cleanup,
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceTask::RecomputeBaseline => f.write_str("recompute_baseline"),
            MaintenanceTask::Cleanup => f.write_str("cleanup"),
        }
    }
}

struct Job {
    task: MaintenanceTask,
    schedule: CronSchedule,
    next: Option<DateTime<Utc>>,
}

/// Tracks the next fire time of each maintenance job.
pub struct MaintenanceSchedule {
    jobs: Vec<Job>,
}

impl MaintenanceSchedule {
    pub fn from_config(config: &MaintenanceConfig, now: DateTime<Utc>) -> Result<Self> {
        let entries = [
            (MaintenanceTask::RecomputeBaseline, &config.baseline_cron),
            (MaintenanceTask::Cleanup, &config.cleanup_cron),
        ];
        let mut jobs = Vec::with_capacity(entries.len());
        for (task, expr) in entries {
            let schedule = CronSchedule::from_str(expr)
                .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;
            let next = schedule.after(&now).next();
            jobs.push(Job { task, schedule, next });
        }
        Ok(Self { jobs })
    }

    /// Tasks whose fire time has passed, in configuration order.
    ///
    /// Each returned job is rescheduled strictly after `now`, so missed fire
    /// times collapse into a single run.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<MaintenanceTask> {
        let mut due = Vec::new();
        for job in &mut self.jobs {
            if job.next.is_some_and(|next| next <= now) {
                due.push(job.task);
                job.next = job.schedule.after(&now).next();
            }
        }
        due
    }

    /// Next fire time of `task`, if it has one.
    pub fn next_run(&self, task: MaintenanceTask) -> Option<DateTime<Utc>> {
        self.jobs.iter().find(|j| j.task == task).and_then(|j| j.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_next_runs_from_defaults() {
        let schedule = MaintenanceSchedule::from_config(&MaintenanceConfig::default(), at(0, 0, 0)).unwrap();
        assert_eq!(schedule.next_run(MaintenanceTask::RecomputeBaseline), Some(at(3, 0, 0)));
        assert_eq!(schedule.next_run(MaintenanceTask::Cleanup), Some(at(3, 30, 0)));
    }

    #[test]
    fn test_due_fires_once_and_reschedules() {
        let mut schedule = MaintenanceSchedule::from_config(&MaintenanceConfig::default(), at(0, 0, 0)).unwrap();
        assert!(schedule.due(at(2, 59, 59)).is_empty());
        assert_eq!(schedule.due(at(3, 0, 0)), vec![MaintenanceTask::RecomputeBaseline]);
        assert!(schedule.due(at(3, 0, 0)).is_empty());

        let tomorrow = Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap();
        assert_eq!(schedule.next_run(MaintenanceTask::RecomputeBaseline), Some(tomorrow));
    }

    #[test]
    fn test_missed_runs_collapse() {
        let mut schedule = MaintenanceSchedule::from_config(&MaintenanceConfig::default(), at(0, 0, 0)).unwrap();
        // loop stalled past both fire times
        let due = schedule.due(at(4, 0, 0));
        assert_eq!(due, vec![MaintenanceTask::RecomputeBaseline, MaintenanceTask::Cleanup]);
        assert!(schedule.due(at(5, 0, 0)).is_empty());
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        let config = MaintenanceConfig {
            baseline_cron: "nightly".to_string(),
            ..Default::default()
        };
        assert!(MaintenanceSchedule::from_config(&config, at(0, 0, 0)).is_err());
    }
}
