//! Telemetry API
//! Mission: Gate telemetry payloads, audit every rejection, serve the series

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::gateway::{enforce_https, ApiError};
use crate::state::AppState;

use super::models::{
    TelemetryAnomaly, TelemetryBaseline, TelemetryMetricSummary, TelemetryPayload, TelemetrySeries,
};
use super::store::TelemetryIngestError;
use super::taxonomy::{metric_unit, normalise_samples, TelemetryValidationError};

#[derive(Debug, Serialize)]
pub struct TelemetryIngestResponse {
    pub status: String,
    pub accepted_samples: usize,
    pub anomalies_flagged: usize,
}

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub metric_name: String,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

fn validate_payload(
    payload: &TelemetryPayload,
    now: DateTime<Utc>,
    stale_seconds: i64,
    future_seconds: i64,
) -> Result<(), TelemetryValidationError> {
    if payload.schema_version != "v1" {
        return Err(TelemetryValidationError::new("schema_version_unsupported"));
    }
    if payload.samples.is_empty() {
        return Err(TelemetryValidationError::new("samples_required"));
    }

    let oldest_allowed = now - Duration::seconds(stale_seconds);
    let newest_allowed = now + Duration::seconds(future_seconds);
    for sample in &payload.samples {
        if sample.observed_at < oldest_allowed {
            return Err(TelemetryValidationError::new("sample_stale"));
        }
        if sample.observed_at > newest_allowed {
            return Err(TelemetryValidationError::new("sample_in_future"));
        }
    }

    let mut seen_names = std::collections::HashSet::new();
    for sample in &payload.samples {
        if !seen_names.insert(sample.name.as_str()) {
            return Err(TelemetryValidationError::new("duplicate_metric"));
        }
    }
    Ok(())
}

/// Accept a telemetry payload after the full validation gate.
pub async fn ingest_telemetry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TelemetryPayload>,
) -> Result<Json<TelemetryIngestResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    let settings = &state.settings.telemetry;
    let now = Utc::now();

    let reject = |reason: &'static str, error: ApiError| {
        state.telemetry.record_rejection(
            payload.payload_id,
            &payload.tenant_id,
            &payload.asset_id,
            reason,
        );
        error
    };

    if payload.samples.len() > settings.sample_limit {
        return Err(reject("payload_too_large", ApiError::too_large("payload_too_large")));
    }
    if payload.collected_at < now - Duration::seconds(settings.stale_seconds) {
        return Err(reject("payload_stale", ApiError::unprocessable("payload_stale")));
    }
    if payload.collected_at > now + Duration::seconds(settings.future_seconds) {
        return Err(reject(
            "payload_in_future",
            ApiError::unprocessable("payload_in_future"),
        ));
    }

    if let Err(validation) = validate_payload(
        &payload,
        now,
        settings.stale_seconds,
        settings.future_seconds,
    ) {
        return Err(reject(validation.reason, ApiError::unprocessable(validation.reason)));
    }
    let samples = match normalise_samples(&payload.samples) {
        Ok(samples) => samples,
        Err(validation) => {
            return Err(reject(validation.reason, ApiError::unprocessable(validation.reason)));
        }
    };

    let anomalies = match state.telemetry.ingest(
        &payload,
        &samples,
        settings.baseline_window,
        settings.anomaly_stddev_threshold,
    ) {
        Ok(anomalies) => anomalies,
        Err(TelemetryIngestError::Replay) => {
            return Err(reject("payload_replay", ApiError::conflict("payload_replay")));
        }
        Err(TelemetryIngestError::Storage(storage_error)) => {
            error!(error = %storage_error, "telemetry ingest failed");
            return Err(reject("ingest_failed", ApiError::unavailable("ingest_failed")));
        }
    };

    Ok(Json(TelemetryIngestResponse {
        status: "accepted".to_string(),
        accepted_samples: samples.len(),
        anomalies_flagged: anomalies,
    }))
}

pub async fn list_telemetry_metrics(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Result<Json<Vec<TelemetryMetricSummary>>, ApiError> {
    let metrics = state.telemetry.list_metrics(&asset_id).map_err(|error| {
        error!(%error, "metric summary query failed");
        ApiError::unavailable("storage_unavailable")
    })?;
    Ok(Json(metrics))
}

pub async fn get_telemetry_series(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<TelemetrySeries>, ApiError> {
    let unit = metric_unit(&query.metric_name)
        .map_err(|validation| ApiError::unprocessable(validation.reason))?;
    let series = state
        .telemetry
        .series(
            &asset_id,
            &query.metric_name,
            unit,
            query.since,
            query.until,
            query.limit.unwrap_or(500).min(5000),
        )
        .map_err(|error| {
            error!(%error, "series query failed");
            ApiError::unavailable("storage_unavailable")
        })?;
    Ok(Json(series))
}

pub async fn list_telemetry_baselines(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Result<Json<Vec<TelemetryBaseline>>, ApiError> {
    let baselines = state.telemetry.list_baselines(&asset_id).map_err(|error| {
        error!(%error, "baseline query failed");
        ApiError::unavailable("storage_unavailable")
    })?;
    Ok(Json(baselines))
}

pub async fn list_telemetry_anomalies(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(query): Query<AnomalyQuery>,
) -> Result<Json<Vec<TelemetryAnomaly>>, ApiError> {
    let anomalies = state
        .telemetry
        .list_anomalies(
            &asset_id,
            query.status.as_deref(),
            query.since,
            query.limit.unwrap_or(200).min(1000),
        )
        .map_err(|error| {
            error!(%error, "anomaly query failed");
            ApiError::unavailable("storage_unavailable")
        })?;
    Ok(Json(anomalies))
}
