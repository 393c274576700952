//! Patch API
//! Mission: Drive the detection → policy → plan → result → evidence pipeline

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::gateway::{enforce_https, ApiError};
use crate::state::AppState;

use super::evidence::build_evidence;
use super::models::{
    AssetPatchState, DetectionBatch, EvidenceRecord, ExecutionPlan, ExecutionPlanRequest,
    ExecutionResultRequest, PatchPolicy, PlanStatus, TaskManifest, VerificationStatus,
};
use super::policy::evaluate_patches;
use super::scheduler::build_execution_plan;
use super::store::PatchStoreError;
use super::tasks::build_task_manifest;

impl From<PatchStoreError> for ApiError {
    fn from(error: PatchStoreError) -> Self {
        ApiError::conflict(error.code())
    }
}

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub status: String,
    pub detection_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    pub status: String,
    pub policy_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ExecutionPlanResponse {
    pub status: String,
    pub plan: ExecutionPlan,
}

#[derive(Debug, Serialize)]
pub struct ExecutionResultResponse {
    pub status: String,
    pub plan_status: PlanStatus,
}

#[derive(Debug, Deserialize)]
pub struct ManifestQuery {
    pub issued_by: String,
}

#[derive(Debug, Deserialize)]
pub struct AssetStateQuery {
    pub tenant_id: String,
    pub asset_id: String,
}

/// Record an agent patch detection payload.
pub async fn record_detection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DetectionBatch>,
) -> Result<Json<DetectionResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    if payload.patches.len() > state.settings.patch.max_patches_per_batch {
        return Err(ApiError::too_large("patch_batch_too_large"));
    }
    let detection_id = payload.detection_id;
    state.patch.record_detection(payload)?;
    Ok(Json(DetectionResponse {
        status: "recorded".to_string(),
        detection_id,
    }))
}

pub async fn get_detection(
    State(state): State<AppState>,
    Path(detection_id): Path<Uuid>,
) -> Result<Json<DetectionBatch>, ApiError> {
    state
        .patch
        .get_detection(detection_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("detection_not_found"))
}

/// Record a signed patch policy definition.
pub async fn record_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PatchPolicy>,
) -> Result<Json<PolicyResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    let policy_id = payload.policy_id;
    state.patch.record_policy(payload)?;
    Ok(Json(PolicyResponse {
        status: "recorded".to_string(),
        policy_id,
    }))
}

pub async fn get_policy(
    State(state): State<AppState>,
    Path(policy_id): Path<Uuid>,
) -> Result<Json<PatchPolicy>, ApiError> {
    state
        .patch
        .get_policy(policy_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("policy_not_found"))
}

/// Generate a policy-driven execution plan.
pub async fn create_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ExecutionPlanRequest>,
) -> Result<Json<ExecutionPlanResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;

    let detection = state
        .patch
        .get_detection(payload.detection_id)
        .ok_or_else(|| ApiError::not_found("detection_not_found"))?;
    let policy = state
        .patch
        .get_policy(payload.policy_id)
        .ok_or_else(|| ApiError::not_found("policy_not_found"))?;

    if detection.tenant_id != payload.tenant_id || detection.asset_id != payload.asset_id {
        return Err(ApiError::forbidden("detection_scope_mismatch"));
    }
    if policy.tenant_id != payload.tenant_id {
        return Err(ApiError::forbidden("policy_scope_mismatch"));
    }
    if !policy.asset_ids.is_empty() && !policy.asset_ids.contains(&payload.asset_id) {
        return Err(ApiError::forbidden("policy_asset_not_allowed"));
    }

    let eligibility = evaluate_patches(&policy, &detection.patches);
    let plan = build_execution_plan(
        payload.plan_id,
        &payload.tenant_id,
        &payload.asset_id,
        &policy,
        payload.detection_id,
        &eligibility,
    );
    state.patch.record_plan(plan.clone())?;

    Ok(Json(ExecutionPlanResponse {
        status: "planned".to_string(),
        plan,
    }))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<ExecutionPlan>, ApiError> {
    state
        .patch
        .get_plan(plan_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("plan_not_found"))
}

fn validate_log_limit(
    max_log_bytes: usize,
    value: Option<&str>,
    field_name: &str,
) -> Result<(), ApiError> {
    if let Some(value) = value {
        if value.len() > max_log_bytes {
            return Err(ApiError::too_large(format!("{field_name}_too_large")));
        }
    }
    Ok(())
}

/// Record execution results and verification outcomes.
pub async fn record_results(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ExecutionResultRequest>,
) -> Result<Json<ExecutionResultResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;

    if payload.plan_id != plan_id {
        return Err(ApiError::bad_request("plan_id_mismatch"));
    }
    let mut plan = state
        .patch
        .get_plan(plan_id)
        .ok_or_else(|| ApiError::not_found("plan_not_found"))?;
    let detection = state.patch.get_detection(plan.detection_id);
    let policy = state.patch.get_policy(plan.policy_id);
    let (detection, policy) = match (detection, policy) {
        (Some(detection), Some(policy)) => (detection, policy),
        _ => return Err(ApiError::not_found("plan_dependencies_missing")),
    };

    if plan.tenant_id != payload.tenant_id || plan.asset_id != payload.asset_id {
        return Err(ApiError::forbidden("plan_scope_mismatch"));
    }

    let plan_patches: HashSet<&str> = plan.execution_order.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    for result in &payload.results {
        validate_log_limit(
            state.settings.patch.max_log_bytes,
            result.stdout.as_deref(),
            "stdout",
        )?;
        validate_log_limit(
            state.settings.patch.max_log_bytes,
            result.stderr.as_deref(),
            "stderr",
        )?;
        if !plan_patches.contains(result.patch_id.as_str()) {
            return Err(ApiError::bad_request("result_patch_not_in_plan"));
        }
        if !seen.insert(result.patch_id.as_str()) {
            return Err(ApiError::bad_request("duplicate_result_patch_ids"));
        }
        if result.status == "failed" && result.failure_type.is_none() {
            return Err(ApiError::bad_request("failure_type_required"));
        }
    }
    if seen.len() != plan_patches.len() {
        return Err(ApiError::bad_request("missing_result_patches"));
    }

    let reboot_needed = detection
        .patches
        .iter()
        .any(|patch| patch.requires_reboot && plan_patches.contains(patch.patch_id.as_str()));
    if reboot_needed && !payload.reboot_confirmed {
        return Err(ApiError::bad_request("reboot_required_not_confirmed"));
    }

    let any_failed = payload.results.iter().any(|result| result.status == "failed");
    plan.status = if payload.verification_status == VerificationStatus::Passed && !any_failed {
        PlanStatus::Completed
    } else {
        PlanStatus::Failed
    };

    let evidence = build_evidence(
        &plan,
        &detection,
        &policy,
        &payload.results,
        payload.reboot_confirmed,
        payload.verification_status,
        payload.verification_notes.as_deref(),
        payload.started_at,
        payload.finished_at,
    )
    .map_err(|_| ApiError::unavailable("storage_unavailable"))?;

    let plan_status = plan.status;
    state.patch.record_outcome(plan, evidence)?;

    Ok(Json(ExecutionResultResponse {
        status: "recorded".to_string(),
        plan_status,
    }))
}

/// Return a deterministic task manifest for an execution plan.
pub async fn get_task_manifest(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Query(query): Query<ManifestQuery>,
) -> Result<Json<TaskManifest>, ApiError> {
    let plan = state
        .patch
        .get_plan(plan_id)
        .ok_or_else(|| ApiError::not_found("plan_not_found"))?;
    Ok(Json(build_task_manifest(&plan, &query.issued_by)))
}

/// Retrieve immutable evidence for a plan.
pub async fn get_evidence(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<EvidenceRecord>, ApiError> {
    state
        .patch
        .get_evidence(plan_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("evidence_not_found"))
}

/// Current patch state for an asset (normal or blocked).
pub async fn get_asset_patch_state(
    State(state): State<AppState>,
    Query(query): Query<AssetStateQuery>,
) -> Result<Json<AssetPatchState>, ApiError> {
    state
        .patch
        .asset_state(&query.tenant_id, &query.asset_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("asset_state_not_found"))
}
