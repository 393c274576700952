//! Event Ingestion API
//! Mission: Signed batch intake with replay protection and partial results

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;

use crate::gateway::{enforce_https, require_signature_headers, ApiError};
use crate::security::verify_signature;
use crate::state::AppState;

use super::models::{
    EventBatch, EventClockDrift, EventGapReport, EventIngestLogRecord, EventIngestResponse,
    EventRecord,
};
use super::validate::validate_batch;

#[derive(Debug, Deserialize)]
pub struct RecentEventsQuery {
    pub tenant_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub event_category: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub event_category: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct IngestLogQuery {
    pub tenant_id: Option<String>,
    pub asset_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

fn storage_error(error: anyhow::Error) -> ApiError {
    error!(%error, "event storage failure");
    ApiError::unavailable("storage_unavailable")
}

/// Accept a signed event batch.
///
/// The signature covers the raw request bytes, so the handler consumes the
/// body itself instead of letting the framework parse it first.
pub async fn ingest_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EventIngestResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;

    let batch: EventBatch = serde_json::from_slice(&body)
        .map_err(|_| ApiError::unprocessable("invalid_payload"))?;
    let settings = &state.settings.events;

    if state
        .events
        .payload_exists(batch.payload_id)
        .map_err(storage_error)?
    {
        state.events.record_batch_log(
            &batch,
            "rejected",
            false,
            0,
            batch.events.len(),
            Some("payload_replay"),
        );
        return Err(ApiError::conflict("payload_replay"));
    }

    let signed = match require_signature_headers(&headers, "invalid_signature_timestamp") {
        Ok(signed) => signed,
        Err(api_error) => {
            state.events.record_batch_log(
                &batch,
                "rejected",
                false,
                0,
                batch.events.len(),
                Some(api_error.code.as_ref()),
            );
            return Err(api_error);
        }
    };

    if let Err(failure) = verify_signature(
        &state.settings.signing,
        &body,
        &signed.signature,
        signed.timestamp,
    ) {
        state.events.record_batch_log(
            &batch,
            "rejected",
            false,
            0,
            batch.events.len(),
            Some(failure.reason()),
        );
        return Err(failure.into());
    }

    if let Err(validation) = validate_batch(&batch, settings.batch_limit) {
        state.events.record_batch_log(
            &batch,
            "rejected",
            true,
            0,
            batch.events.len(),
            Some(validation.reason),
        );
        return Err(ApiError::unprocessable(validation.reason));
    }

    let outcome = state
        .events
        .ingest_batch(
            &batch,
            settings.stale_seconds,
            settings.future_seconds,
            settings.clock_drift_seconds,
        )
        .map_err(storage_error)?;

    let status = if outcome.rejected == 0 {
        "accepted"
    } else {
        "partial"
    };
    Ok(Json(EventIngestResponse {
        status: status.to_string(),
        accepted: outcome.accepted,
        rejected: outcome.rejected,
        gaps: outcome.gaps,
        drifts: outcome.drifts,
    }))
}

pub async fn list_recent_events(
    State(state): State<AppState>,
    Query(query): Query<RecentEventsQuery>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    let events = state
        .events
        .list_recent(
            query.tenant_id.as_deref(),
            query.since,
            query.event_category.as_deref(),
            query.event_type.as_deref(),
            query.limit.unwrap_or(200).min(1000),
        )
        .map_err(storage_error)?;
    Ok(Json(events))
}

pub async fn get_asset_timeline(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    let events = state
        .events
        .asset_timeline(
            &asset_id,
            query.since,
            query.until,
            query.event_category.as_deref(),
            query.event_type.as_deref(),
            query.limit.unwrap_or(500).min(5000),
        )
        .map_err(storage_error)?;
    Ok(Json(events))
}

pub async fn list_event_gaps(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<EventGapReport>>, ApiError> {
    let gaps = state
        .events
        .list_gaps(&asset_id, query.limit.unwrap_or(100).min(1000))
        .map_err(storage_error)?;
    Ok(Json(gaps))
}

pub async fn list_event_drifts(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<EventClockDrift>>, ApiError> {
    let drifts = state
        .events
        .list_drifts(&asset_id, query.limit.unwrap_or(100).min(1000))
        .map_err(storage_error)?;
    Ok(Json(drifts))
}

pub async fn list_event_ingest_log(
    State(state): State<AppState>,
    Query(query): Query<IngestLogQuery>,
) -> Result<Json<Vec<EventIngestLogRecord>>, ApiError> {
    let log = state
        .events
        .list_ingest_log(
            query.tenant_id.as_deref(),
            query.asset_id.as_deref(),
            query.status.as_deref(),
            query.limit.unwrap_or(200).min(1000),
        )
        .map_err(storage_error)?;
    Ok(Json(log))
}
