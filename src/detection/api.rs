//! Detection API
//! Mission: Rule registry management, event evaluation, finding lifecycle

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::{enforce_https, require_transport_identity, ApiError};
use crate::state::AppState;

use super::engine::evaluate_event;
use super::models::{
    ContextSnapshot, Finding, FindingState, NormalisedEvent, RuleDefinition, SuppressionDecision,
};
use super::rules::validate_rule_definition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIngestRequest {
    pub event: NormalisedEvent,
    pub context: Option<ContextSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct EventIngestResponse {
    pub status: String,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub status: String,
    pub rule: RuleDefinition,
}

#[derive(Debug, Serialize)]
pub struct RuleListResponse {
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Serialize)]
pub struct FindingListResponse {
    pub findings: Vec<Finding>,
}

#[derive(Debug, Deserialize)]
pub struct FindingListQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DismissFindingRequest {
    pub justification: String,
    pub dismissed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DismissFindingResponse {
    pub status: String,
    pub finding_id: Uuid,
    pub dismissed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SuppressionListResponse {
    pub decisions: Vec<SuppressionDecision>,
}

fn parse_state(raw: &str) -> Option<FindingState> {
    match raw {
        "open" => Some(FindingState::Open),
        "dismissed" => Some(FindingState::Dismissed),
        "superseded" => Some(FindingState::Superseded),
        _ => None,
    }
}

/// Return all configured rules.
pub async fn list_rules(State(state): State<AppState>) -> Json<RuleListResponse> {
    Json(RuleListResponse {
        rules: state.detection.rules.list(),
    })
}

/// Register a new rule definition after install-time validation.
pub async fn add_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RuleDefinition>,
) -> Result<Json<RuleResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    require_transport_identity(&headers)
        .map_err(|_| ApiError::bad_request("client_identity_required"))?;
    validate_rule_definition(
        &payload,
        &state.settings.detection.allowed_explanation_variables,
    )?;
    state.detection.rules.add(payload.clone());
    Ok(Json(RuleResponse {
        status: "recorded".to_string(),
        rule: payload,
    }))
}

/// Ingest a normalised event and evaluate it against the rules.
pub async fn ingest_detection_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<EventIngestRequest>,
) -> Result<Json<EventIngestResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    require_transport_identity(&headers)
        .map_err(|_| ApiError::bad_request("client_identity_required"))?;

    if payload.event.received_at < payload.event.occurred_at {
        return Err(ApiError::bad_request("received_before_occurred"));
    }
    if let Some(context) = &payload.context {
        if let Some(asset) = &context.asset {
            if asset.asset_id != payload.event.asset_id {
                return Err(ApiError::bad_request("context_asset_mismatch"));
            }
        }
        if let Some(identity) = &context.identity {
            if identity.identity_id != payload.event.identity_id {
                return Err(ApiError::bad_request("context_identity_mismatch"));
            }
        }
    }

    state.detection.events.add(payload.event.clone());
    let findings = evaluate_event(
        &payload.event,
        payload.context.as_ref(),
        &state.settings.detection,
        &state.detection,
    );
    Ok(Json(EventIngestResponse {
        status: "processed".to_string(),
        findings,
    }))
}

/// List findings with optional state filter.
pub async fn list_findings(
    State(state): State<AppState>,
    Query(query): Query<FindingListQuery>,
) -> Json<FindingListResponse> {
    let wanted = query.state.as_deref().and_then(parse_state);
    Json(FindingListResponse {
        findings: state.detection.findings.list(wanted),
    })
}

pub async fn get_finding(
    State(state): State<AppState>,
    Path(finding_id): Path<Uuid>,
) -> Result<Json<Finding>, ApiError> {
    state
        .detection
        .findings
        .get(finding_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("finding_not_found"))
}

/// Dismiss a finding with justification and identity.
pub async fn dismiss_finding(
    State(state): State<AppState>,
    Path(finding_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<DismissFindingRequest>,
) -> Result<Json<DismissFindingResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    require_transport_identity(&headers)
        .map_err(|_| ApiError::bad_request("client_identity_required"))?;

    state
        .detection
        .findings
        .get(finding_id)
        .ok_or_else(|| ApiError::not_found("finding_not_found"))?;
    state
        .detection
        .findings
        .dismiss(finding_id)
        .ok_or_else(|| ApiError::conflict("dismiss_failed"))?;

    Ok(Json(DismissFindingResponse {
        status: "dismissed".to_string(),
        finding_id,
        dismissed_at: payload.dismissed_at,
    }))
}

/// List suppression decisions for auditing.
pub async fn list_suppressions(State(state): State<AppState>) -> Json<SuppressionListResponse> {
    Json(SuppressionListResponse {
        decisions: state.detection.suppressions.list(),
    })
}
