//! Background maintenance -- baseline recomputation and retention cleanup on cron schedules.

pub mod cron;
pub mod engine;

// Re-export common types
pub use self::cron::{MaintenanceSchedule, MaintenanceTask};
pub use self::engine::run_maintenance_loop;
