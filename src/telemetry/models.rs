//! Telemetry payloads and projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub name: String,
    pub unit: Option<String>,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub payload_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub collected_at: DateTime<Utc>,
    pub schema_version: String,
    pub samples: Vec<TelemetrySample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMetricSummary {
    pub metric_name: String,
    pub unit: String,
    pub sample_count: i64,
    pub last_observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySeriesPoint {
    pub observed_at: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySeries {
    pub asset_id: String,
    pub metric_name: String,
    pub unit: String,
    pub points: Vec<TelemetrySeriesPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryBaseline {
    pub asset_id: String,
    pub metric_name: String,
    pub window_size: usize,
    pub sample_count: usize,
    pub mean: f64,
    pub stddev: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryAnomaly {
    pub anomaly_id: i64,
    pub asset_id: String,
    pub metric_name: String,
    pub observed_at: DateTime<Utc>,
    pub value: f64,
    pub deviation_multiplier: f64,
    pub status: String,
}
