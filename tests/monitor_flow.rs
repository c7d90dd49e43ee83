//! End-to-end monitor scenarios against a real on-disk store.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use scoring_monitor::analysis::snapshot::SystemHealth;
use scoring_monitor::config::MonitorConfig;
use scoring_monitor::detect::engine::ScoringMonitor;
use scoring_monitor::detect::{AlertType, Severity};
use scoring_monitor::event::ScoringRecord;
use scoring_monitor::storage::events::EventFilter;

fn config_in(dir: &tempfile::TempDir) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.storage.db_path = dir.path().join("monitor.db");
    config
}

fn record(user: &str, address: &str, latency: f64, score: Option<f64>) -> ScoringRecord {
    let mut record = ScoringRecord {
        user_id: user.to_string(),
        api_key: "bank-a".to_string(),
        processing_time: latency,
        source_address: address.to_string(),
        client_agent: "web".to_string(),
        status_code: 200,
        ..Default::default()
    };
    if let Some(s) = score {
        record.response_payload.insert("credit_score".to_string(), json!(s));
    }
    record
}

#[tokio::test]
async fn test_slow_window_raises_response_time_spike() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let monitor = ScoringMonitor::open(config_in(&dir)).await?;

    let mut raised = Vec::new();
    for i in 0..10 {
        raised.extend(monitor.ingest(record(&format!("u{i}"), "10.0.0.1", 2.0, None)).await);
    }

    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].alert_type, AlertType::ResponseTimeSpike);
    assert_eq!(raised[0].severity, Severity::High);
    assert_eq!(raised[0].affected_entities, vec!["bank-a".to_string()]);
    assert_eq!(monitor.current_stats().await.system_health, SystemHealth::Degraded);
    Ok(())
}

#[tokio::test]
async fn test_score_shift_is_medium_between_two_and_three_sigma() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let monitor = ScoringMonitor::open(config_in(&dir)).await?;

    let mut raised = Vec::new();
    for i in 0..20 {
        raised.extend(monitor.ingest(record(&format!("u{i}"), "10.0.0.1", 0.3, Some(900.0))).await);
    }

    // default baseline 500 +/- 150: a 400 point drift is past 2 sigma, short of 3
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].alert_type, AlertType::ScoreDistributionShift);
    assert_eq!(raised[0].severity, Severity::Medium);
    assert_eq!(raised[0].metrics["deviation"], 400.0);
    Ok(())
}

#[tokio::test]
async fn test_repeat_requests_by_user_and_address() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut config = config_in(&dir);
    config.detection.min_events = 1;
    config.detection.error_min_events = 1;
    config.detection.user_request_limit = 3;
    config.detection.address_request_limit = 4;
    config.detection.traffic_multiplier = 1000.0;
    let monitor = ScoringMonitor::open(config).await?;

    let mut kinds = Vec::new();
    for _ in 0..5 {
        for alert in monitor.ingest(record("heavy", "192.0.2.7", 0.3, None)).await {
            kinds.push((alert.alert_type, alert.severity));
        }
    }

    // user fires on requests 4 and 5, address on request 5
    assert_eq!(
        kinds,
        vec![
            (AlertType::RepeatUserRequests, Severity::Medium),
            (AlertType::RepeatUserRequests, Severity::Medium),
            (AlertType::RepeatAddressRequests, Severity::High),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_concurrent_ingestion_loses_nothing() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let monitor = Arc::new(ScoringMonitor::open(config_in(&dir)).await?);

    let mut handles = Vec::new();
    for worker in 0..8 {
        let monitor = monitor.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                monitor
                    .ingest(record(&format!("w{worker}-{i}"), &format!("10.0.{worker}.{i}"), 0.2, None))
                    .await;
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    let stats = monitor.current_stats().await;
    assert_eq!(stats.total_events_tracked, 200);
    assert_eq!(stats.events_last_hour, 200);

    let stored = monitor.query_events(EventFilter::default(), 1000, 0).await?;
    assert_eq!(stored.len(), 200);
    Ok(())
}

#[tokio::test]
async fn test_history_survives_restart() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    {
        let monitor = ScoringMonitor::open(config_in(&dir)).await?;
        for i in 0..5 {
            monitor.ingest(record(&format!("u{i}"), "10.0.0.1", 0.4, Some(700.0))).await;
        }
    }

    let monitor = ScoringMonitor::open(config_in(&dir)).await?;
    let baseline = monitor.baseline().await;
    assert_eq!(baseline.sample_count, 5);
    assert_eq!(baseline.avg_score, 700.0);

    // the window starts empty, persisted history does not refill it
    assert_eq!(monitor.current_stats().await.total_events_tracked, 0);
    assert_eq!(monitor.weekly_summary().await?.volume_metrics.total_requests, 5);
    Ok(())
}
