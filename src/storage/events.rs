//! Persistence for scoring events.
//!
//! Payloads are stored as JSON text so request/response shapes can change
//! between scoring-model versions without a migration.

use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::event::{Payload, ScoringEvent};
use crate::storage::json_column;

const EVENT_COLUMNS: &str = "timestamp, user_id, api_key, request_json, response_json, \
     processing_time, source_address, client_agent, status_code, error_message";

/// Optional filters for event lookups. Time bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl EventFilter {
    pub fn between(start: f64, end: f64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    /// Build the `WHERE` clause and its bound parameters.
    fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut clause = String::from("WHERE 1=1");
        let mut values = Vec::new();
        if let Some(user_id) = &self.user_id {
            clause.push_str(" AND user_id = ?");
            values.push(SqlValue::Text(user_id.clone()));
        }
        if let Some(api_key) = &self.api_key {
            clause.push_str(" AND api_key = ?");
            values.push(SqlValue::Text(api_key.clone()));
        }
        if let Some(start) = self.start {
            clause.push_str(" AND timestamp >= ?");
            values.push(SqlValue::Real(start));
        }
        if let Some(end) = self.end {
            clause.push_str(" AND timestamp <= ?");
            values.push(SqlValue::Real(end));
        }
        (clause, values)
    }
}

/// Status predicate for count queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Any,
    /// `status_code >= 400`
    Errors,
    Success,
}

impl StatusFilter {
    fn sql(self) -> &'static str {
        match self {
            StatusFilter::Any => "",
            StatusFilter::Errors => " AND status_code >= 400",
            StatusFilter::Success => " AND status_code < 400",
        }
    }
}

/// Insert a single event, returning its row id.
pub fn insert(conn: &Connection, event: &ScoringEvent) -> Result<i64> {
    let request_json = serde_json::to_string(&event.request_payload)?;
    let response_json = serde_json::to_string(&event.response_payload)?;

    conn.execute(
        &format!("INSERT INTO scoring_events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
        params![
            event.timestamp,
            event.user_id,
            event.api_key,
            request_json,
            response_json,
            event.processing_time,
            event.source_address,
            event.client_agent,
            event.status_code,
            event.error_message,
        ],
    )
    .context("failed to insert scoring event")?;

    Ok(conn.last_insert_rowid())
}

/// Newest-first page of events matching `filter`.
pub fn query(
    conn: &Connection,
    filter: &EventFilter,
    limit: usize,
    offset: usize,
) -> Result<Vec<ScoringEvent>> {
    let (clause, mut values) = filter.to_sql();
    values.push(SqlValue::Integer(limit as i64));
    values.push(SqlValue::Integer(offset as i64));

    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM scoring_events {clause}
         ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?"
    ))?;
    let rows = stmt.query_map(params_from_iter(values), event_from_row)?;

    let mut events = Vec::new();
    for r in rows {
        events.push(r?);
    }
    Ok(events)
}

/// All events with `start <= timestamp <= end`, oldest first.
pub fn range(conn: &Connection, start: f64, end: f64) -> Result<Vec<ScoringEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM scoring_events
         WHERE timestamp BETWEEN ?1 AND ?2
         ORDER BY timestamp ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![start, end], event_from_row)?;

    let mut events = Vec::new();
    for r in rows {
        events.push(r?);
    }
    Ok(events)
}

/// Processing time and optional credit score of the newest `limit` events at or after `since`.
pub fn recent_samples(conn: &Connection, since: f64, limit: usize) -> Result<Vec<(f64, Option<f64>)>> {
    let mut stmt = conn.prepare(
        "SELECT processing_time, response_json FROM scoring_events
         WHERE timestamp >= ?1
         ORDER BY timestamp DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![since, limit as i64], |row| {
        Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut samples = Vec::new();
    for r in rows {
        let (processing_time, response_json) = r?;
        let score = serde_json::from_str::<Payload>(&response_json)
            .ok()
            .and_then(|p| p.get(crate::event::CREDIT_SCORE_KEY).and_then(|v| v.as_f64()));
        samples.push((processing_time, score));
    }
    Ok(samples)
}

/// Count events in `[start, end]` (either bound optional) matching `status`.
pub fn count(conn: &Connection, start: Option<f64>, end: Option<f64>, status: StatusFilter) -> Result<u64> {
    let filter = EventFilter {
        start,
        end,
        ..Default::default()
    };
    let (clause, values) = filter.to_sql();
    let n: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM scoring_events {clause}{}", status.sql()),
        params_from_iter(values),
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Delete events with `timestamp < cutoff`.
pub fn delete_before(conn: &Connection, cutoff: f64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM scoring_events WHERE timestamp < ?1", params![cutoff])?;
    Ok(deleted)
}

/// Event counts per whole hour since `start`, as `(hour_offset, count)`.
pub fn hourly_counts(conn: &Connection, start: f64, status: StatusFilter) -> Result<Vec<(i64, u64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT CAST((timestamp - ?1) / 3600 AS INTEGER) AS hour_offset, COUNT(*)
         FROM scoring_events
         WHERE timestamp >= ?1{}
         GROUP BY hour_offset
         ORDER BY hour_offset",
        status.sql()
    ))?;
    let rows = stmt.query_map(params![start], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64))
    })?;

    let mut buckets = Vec::new();
    for r in rows {
        buckets.push(r?);
    }
    Ok(buckets)
}

/// The busiest API keys since `since`, highest volume first.
pub fn top_api_keys(conn: &Connection, since: f64, limit: usize) -> Result<Vec<(String, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT api_key, COUNT(*) AS request_count
         FROM scoring_events
         WHERE timestamp >= ?1
         GROUP BY api_key
         ORDER BY request_count DESC, api_key ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![since, limit as i64], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
    })?;

    let mut keys = Vec::new();
    for r in rows {
        keys.push(r?);
    }
    Ok(keys)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ScoringEvent> {
    Ok(ScoringEvent {
        timestamp: row.get(0)?,
        user_id: row.get(1)?,
        api_key: row.get(2)?,
        request_payload: json_column(row, 3)?,
        response_payload: json_column(row, 4)?,
        processing_time: row.get(5)?,
        source_address: row.get(6)?,
        client_agent: row.get(7)?,
        status_code: row.get(8)?,
        error_message: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ScoringRecord;
    use crate::storage::test_support::temp_pool;
    use serde_json::json;

    fn event(ts: f64, user: &str, key: &str, status: u16, score: Option<f64>) -> ScoringEvent {
        let mut response = Payload::new();
        if let Some(s) = score {
            response.insert("credit_score".into(), json!(s));
        }
        ScoringEvent::at(
            ts,
            ScoringRecord {
                user_id: user.into(),
                api_key: key.into(),
                request_payload: json!({"income": 1200, "tags": ["a", "b"]})
                    .as_object()
                    .cloned()
                    .unwrap(),
                response_payload: response,
                processing_time: 0.25,
                source_address: "10.0.0.1".into(),
                client_agent: "test".into(),
                status_code: status,
                error_message: None,
            },
        )
    }

    #[test]
    fn test_insert_and_query_preserves_payloads() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let original = event(100.0, "u1", "k1", 200, Some(640.0));
        insert(&conn, &original).unwrap();

        let found = query(&conn, &EventFilter::default(), 10, 0).unwrap();
        assert_eq!(found, vec![original]);
    }

    #[test]
    fn test_query_filters_and_paging() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        for i in 0..10 {
            let user = if i % 2 == 0 { "even" } else { "odd" };
            insert(&conn, &event(i as f64, user, "k1", 200, None)).unwrap();
        }

        let filter = EventFilter {
            user_id: Some("even".into()),
            ..Default::default()
        };
        let page = query(&conn, &filter, 2, 1).unwrap();
        let stamps: Vec<f64> = page.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![6.0, 4.0]);

        let windowed = query(&conn, &EventFilter::between(3.0, 5.0), 100, 0).unwrap();
        assert_eq!(windowed.len(), 3);
    }

    #[test]
    fn test_count_by_status() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        insert(&conn, &event(1.0, "u", "k", 200, None)).unwrap();
        insert(&conn, &event(2.0, "u", "k", 500, None)).unwrap();
        insert(&conn, &event(3.0, "u", "k", 404, None)).unwrap();

        assert_eq!(count(&conn, None, None, StatusFilter::Any).unwrap(), 3);
        assert_eq!(count(&conn, None, None, StatusFilter::Errors).unwrap(), 2);
        assert_eq!(count(&conn, Some(2.5), None, StatusFilter::Success).unwrap(), 0);
    }

    #[test]
    fn test_delete_before_is_strict() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        for ts in [1.0, 2.0, 3.0] {
            insert(&conn, &event(ts, "u", "k", 200, None)).unwrap();
        }
        assert_eq!(delete_before(&conn, 2.0).unwrap(), 1);
        assert_eq!(count(&conn, None, None, StatusFilter::Any).unwrap(), 2);
    }

    #[test]
    fn test_recent_samples_extracts_scores() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        insert(&conn, &event(10.0, "u", "k", 200, Some(700.0))).unwrap();
        insert(&conn, &event(20.0, "u", "k", 200, None)).unwrap();
        insert(&conn, &event(1.0, "u", "k", 200, Some(300.0))).unwrap();

        let samples = recent_samples(&conn, 5.0, 10).unwrap();
        assert_eq!(samples, vec![(0.25, None), (0.25, Some(700.0))]);
    }

    #[test]
    fn test_hourly_counts_and_top_keys() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        insert(&conn, &event(10.0, "u", "alpha", 200, None)).unwrap();
        insert(&conn, &event(20.0, "u", "alpha", 500, None)).unwrap();
        insert(&conn, &event(3700.0, "u", "beta", 200, None)).unwrap();

        assert_eq!(hourly_counts(&conn, 0.0, StatusFilter::Any).unwrap(), vec![(0, 2), (1, 1)]);
        assert_eq!(hourly_counts(&conn, 0.0, StatusFilter::Errors).unwrap(), vec![(0, 1)]);
        assert_eq!(
            top_api_keys(&conn, 0.0, 10).unwrap(),
            vec![("alpha".to_string(), 2), ("beta".to_string(), 1)]
        );
    }

    #[test]
    fn test_malformed_payload_row_is_an_error() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO scoring_events (timestamp, user_id, api_key, request_json, response_json,
             processing_time, source_address, client_agent, status_code, error_message)
             VALUES (1.0, 'u', 'k', '{\"income\": 1200', '{}', 0.2, '10.0.0.1', 'test', 200, NULL)",
            [],
        )
        .unwrap();
        assert!(query(&conn, &EventFilter::default(), 10, 0).is_err());
    }
}
