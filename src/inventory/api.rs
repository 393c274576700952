//! Inventory API
//! Mission: Accept authoritative inventory snapshots and expose asset views

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::gateway::{enforce_https, ApiError};
use crate::state::AppState;

use super::models::{
    AssetInventoryOverview, AssetRecord, AssetStateResponse, HardwareInventory, InventorySnapshot,
    LocalGroupsInventory, LocalUsersInventory, OsInventory, SoftwareInventory,
};

#[derive(Debug, Deserialize)]
pub struct AssetListQuery {
    pub tenant_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub since: Option<DateTime<Utc>>,
}

fn storage_error(error: anyhow::Error) -> ApiError {
    error!(%error, "inventory storage failure");
    ApiError::unavailable("storage_unavailable")
}

fn accepted() -> Json<Value> {
    Json(json!({ "status": "accepted" }))
}

pub async fn ingest_hardware(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<HardwareInventory>,
) -> Result<Json<Value>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    state
        .inventory
        .upsert_hardware(&payload)
        .map_err(storage_error)?;
    Ok(accepted())
}

pub async fn ingest_os(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OsInventory>,
) -> Result<Json<Value>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    state.inventory.upsert_os(&payload).map_err(storage_error)?;
    Ok(accepted())
}

pub async fn ingest_software(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SoftwareInventory>,
) -> Result<Json<Value>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    state
        .inventory
        .upsert_software(&payload)
        .map_err(storage_error)?;
    Ok(accepted())
}

pub async fn ingest_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LocalUsersInventory>,
) -> Result<Json<Value>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    state
        .inventory
        .upsert_users(&payload)
        .map_err(storage_error)?;
    Ok(accepted())
}

pub async fn ingest_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LocalGroupsInventory>,
) -> Result<Json<Value>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    state
        .inventory
        .upsert_groups(&payload)
        .map_err(storage_error)?;
    Ok(accepted())
}

pub async fn get_inventory(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Result<Json<InventorySnapshot>, ApiError> {
    let snapshot = state
        .inventory
        .snapshot(&asset_id)
        .map_err(storage_error)?;
    Ok(Json(snapshot))
}

pub async fn get_inventory_state(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Result<Json<AssetStateResponse>, ApiError> {
    let asset_state = state
        .inventory
        .asset_state(&asset_id)
        .map_err(storage_error)?;
    Ok(Json(asset_state))
}

pub async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<AssetListQuery>,
) -> Result<Json<Vec<AssetRecord>>, ApiError> {
    let assets = state
        .inventory
        .list_assets(
            query.tenant_id.as_deref(),
            query.limit.unwrap_or(100).min(500),
            query.offset.unwrap_or(0),
            query.since,
        )
        .map_err(storage_error)?;
    Ok(Json(assets))
}

pub async fn list_asset_overviews(
    State(state): State<AppState>,
    Query(query): Query<AssetListQuery>,
) -> Result<Json<Vec<AssetInventoryOverview>>, ApiError> {
    let overviews = state
        .inventory
        .list_asset_overviews(
            query.tenant_id.as_deref(),
            query.limit.unwrap_or(100).min(500),
            query.offset.unwrap_or(0),
        )
        .map_err(storage_error)?;
    Ok(Json(overviews))
}
