//! API route definitions.

use std::ops::RangeInclusive;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::AppState;
use super::ApiError;
use crate::analysis::dashboard::HealthStatus;
use crate::detect::Severity;
use crate::event::ScoringRecord;
use crate::storage::events::EventFilter;

const EVENT_LIMIT: RangeInclusive<usize> = 1..=1000;
const DEFAULT_EVENT_LIMIT: usize = 100;
const ALERT_HOURS: RangeInclusive<u32> = 1..=168;
const DEFAULT_ALERT_HOURS: u32 = 24;
const CLEANUP_DAYS: RangeInclusive<u32> = 7..=365;
const DEFAULT_CLEANUP_DAYS: u32 = 90;

type ApiResult = Result<Json<Value>, ApiError>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(ingest_event).get(list_events))
        .route("/monitor/stats", get(stats))
        .route("/monitor/alerts", get(alerts))
        .route("/monitor/weekly-summary", get(weekly_summary))
        .route("/monitor/dashboard", get(dashboard))
        .route("/monitor/cleanup", post(cleanup))
        .route("/monitor/baseline", post(recompute_baseline))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn envelope<T: Serialize>(data: T, extra: Value) -> ApiResult {
    let data = serde_json::to_value(data).map_err(anyhow::Error::from)?;
    let mut meta = meta();
    if let (Value::Object(meta), Value::Object(extra)) = (&mut meta, extra) {
        meta.extend(extra);
    }
    Ok(Json(json!({ "data": data, "meta": meta })))
}

fn in_range<T>(name: &str, value: Option<T>, default: T, range: RangeInclusive<T>) -> Result<T, ApiError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    let value = value.unwrap_or(default);
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::BadRequest(format!(
            "{name} must be between {} and {}",
            range.start(),
            range.end()
        )))
    }
}

async fn health(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let check = state.monitor.health_check().await;
    let status = match check.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((status, envelope(check, json!({}))?))
}

async fn ingest_event(State(state): State<AppState>, Json(record): Json<ScoringRecord>) -> ApiResult {
    let raised = state.monitor.ingest(record).await;
    envelope(&raised, json!({ "alerts_raised": raised.len() }))
}

#[derive(Debug, Default, Deserialize)]
struct EventsQuery {
    user_id: Option<String>,
    api_key: Option<String>,
    start: Option<f64>,
    end: Option<f64>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_events(State(state): State<AppState>, Query(q): Query<EventsQuery>) -> ApiResult {
    let limit = in_range("limit", q.limit, DEFAULT_EVENT_LIMIT, EVENT_LIMIT)?;
    let offset = q.offset.unwrap_or(0);
    let filter = EventFilter {
        user_id: q.user_id,
        api_key: q.api_key,
        start: q.start,
        end: q.end,
    };
    let events = state.monitor.query_events(filter, limit, offset).await?;
    envelope(
        &events,
        json!({ "total": events.len(), "limit": limit, "offset": offset }),
    )
}

async fn stats(State(state): State<AppState>) -> ApiResult {
    envelope(state.monitor.current_stats().await, json!({}))
}

#[derive(Debug, Default, Deserialize)]
struct AlertsQuery {
    hours: Option<u32>,
    severity: Option<String>,
}

async fn alerts(State(state): State<AppState>, Query(q): Query<AlertsQuery>) -> ApiResult {
    let hours = in_range("hours", q.hours, DEFAULT_ALERT_HOURS, ALERT_HOURS)?;
    let severity = q
        .severity
        .as_deref()
        .map(str::parse::<Severity>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let alerts = state.monitor.recent_alerts(f64::from(hours), severity).await;
    envelope(
        &alerts,
        json!({ "total": alerts.len(), "hours": hours, "severity": severity }),
    )
}

async fn weekly_summary(State(state): State<AppState>) -> ApiResult {
    envelope(state.monitor.weekly_summary().await?, json!({}))
}

async fn dashboard(State(state): State<AppState>) -> ApiResult {
    envelope(state.monitor.dashboard_data().await?, json!({}))
}

#[derive(Debug, Default, Deserialize)]
struct CleanupQuery {
    days_to_keep: Option<u32>,
}

async fn cleanup(State(state): State<AppState>, Query(q): Query<CleanupQuery>) -> ApiResult {
    let days = in_range("days_to_keep", q.days_to_keep, DEFAULT_CLEANUP_DAYS, CLEANUP_DAYS)?;
    let report = state.monitor.cleanup(days).await?;
    envelope(report, json!({ "days_to_keep": days }))
}

async fn recompute_baseline(State(state): State<AppState>) -> ApiResult {
    envelope(state.monitor.recompute_baseline().await?, json!({}))
}
