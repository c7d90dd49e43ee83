//! Scoring event records handed to the monitor by the scoring service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque key/value payload attached to a scoring request or response.
pub type Payload = Map<String, Value>;

/// Response payload key carrying the numeric credit score.
pub const CREDIT_SCORE_KEY: &str = "credit_score";

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// One scored request, as observed after the scoring computation finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub timestamp: f64,
    pub user_id: String,
    pub api_key: String,
    pub request_payload: Payload,
    pub response_payload: Payload,
    /// Seconds spent computing the score.
    pub processing_time: f64,
    pub source_address: String,
    pub client_agent: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScoringEvent {
    /// Stamp a record with the current time.
    pub fn from_record(record: ScoringRecord) -> Self {
        Self::at(unix_now(), record)
    }

    /// Build an event at an explicit timestamp.
    pub fn at(timestamp: f64, record: ScoringRecord) -> Self {
        Self {
            timestamp,
            user_id: record.user_id,
            api_key: record.api_key,
            request_payload: record.request_payload,
            response_payload: record.response_payload,
            processing_time: record.processing_time.max(0.0),
            source_address: record.source_address,
            client_agent: record.client_agent,
            status_code: record.status_code,
            error_message: record.error_message,
        }
    }

    /// The numeric `credit_score` from the response, if present.
    ///
    /// A missing or non-numeric value means "no score signal", never an error.
    pub fn credit_score(&self) -> Option<f64> {
        self.response_payload
            .get(CREDIT_SCORE_KEY)
            .and_then(Value::as_f64)
            .filter(|s| s.is_finite())
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// The fields the caller supplies per scored request; the monitor adds the timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringRecord {
    pub user_id: String,
    pub api_key: String,
    #[serde(default)]
    pub request_payload: Payload,
    #[serde(default)]
    pub response_payload: Payload,
    pub processing_time: f64,
    #[serde(default)]
    pub source_address: String,
    #[serde(default)]
    pub client_agent: String,
    pub status_code: u16,
    #[serde(default)]
    pub error_message: Option<String>,
}
