//! Event batch payloads and projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_category: String,
    pub event_type: String,
    pub sequence_number: i64,
    pub timestamp_local: DateTime<Utc>,
    pub payload: Value,
    pub payload_hash: String,
    pub severity: String,
    pub source_module: String,
    pub trust_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub payload_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub schema_version: String,
    pub events: Vec<EventEnvelope>,
}

/// Sequence discontinuity for one (asset, source_module) stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventGapReport {
    pub asset_id: String,
    pub source_module: String,
    pub last_seen_sequence: i64,
    pub new_sequence: i64,
    pub gap_size: i64,
}

/// Recorded clock drift between agent-local and receive time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventClockDrift {
    pub asset_id: String,
    pub source_module: String,
    pub event_id: Uuid,
    pub drift_seconds: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIngestResponse {
    pub status: String,
    pub accepted: usize,
    pub rejected: usize,
    pub gaps: Vec<EventGapReport>,
    pub drifts: Vec<EventClockDrift>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub event_category: String,
    pub event_type: String,
    pub source_module: String,
    pub trust_level: String,
    pub severity: String,
    pub sequence_number: i64,
    pub timestamp_local: DateTime<Utc>,
    pub timestamp_received: DateTime<Utc>,
    pub payload: Value,
    pub payload_hash: String,
}

/// One row per submitted batch, regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIngestLogRecord {
    pub payload_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub status: String,
    pub signature_verified: bool,
    pub event_count: usize,
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub reject_reason: Option<String>,
    pub schema_version: String,
    pub received_at: DateTime<Utc>,
}
