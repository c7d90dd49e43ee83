//! Scoring Monitor -- real-time telemetry and anomaly detection for credit-scoring traffic.
//!
//! This crate provides the monitoring engine (sliding window, baseline,
//! detectors, alert feed), SQLite persistence, weekly reporting, the HTTP
//! API and the background maintenance scheduler.

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod event;
pub mod scheduler;
pub mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::MonitorConfig;
use crate::detect::engine::ScoringMonitor;

/// Start the monitor daemon: engine, maintenance scheduler, and API server.
pub async fn serve(config: MonitorConfig) -> Result<()> {
    // 1. Initialize engine (storage + baseline)
    let monitor = Arc::new(ScoringMonitor::open(config).await?);
    let config = monitor.config();

    // 2. Start maintenance scheduler (background task)
    if config.maintenance.enabled {
        let schedule = scheduler::MaintenanceSchedule::from_config(&config.maintenance, chrono::Utc::now())?;
        let engine = monitor.clone();
        tokio::spawn(async move {
            scheduler::run_maintenance_loop(engine, schedule).await;
        });
    } else {
        tracing::info!("Maintenance scheduler disabled");
    }

    // 3. Start API server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(api::state::AppState::new(monitor.clone()));

    tracing::info!(%addr, "Scoring monitor listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Scoring monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
