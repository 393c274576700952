//! PSA API
//! Mission: Ticket intake, human actions, and upstream resolution

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::{enforce_https, ApiError};
use crate::state::AppState;

use super::engine::{compute_priority, compute_sla_deadline};
use super::evidence::build_evidence_hash;
use super::models::{
    ActionRecord, ActionRequest, ActionType, EvidenceRecord, ResolveRequest, TicketIntakeRequest,
    TicketRecord, TicketStatus,
};

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub status: String,
    pub ticket_id: Option<Uuid>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub status: String,
    pub ticket: TicketRecord,
}

#[derive(Debug, Serialize)]
pub struct TicketListResponse {
    pub tickets: Vec<TicketRecord>,
}

#[derive(Debug, Serialize)]
pub struct ActionListResponse {
    pub actions: Vec<ActionRecord>,
}

#[derive(Debug, Serialize)]
pub struct EvidenceListResponse {
    pub evidence: Vec<EvidenceRecord>,
}

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    pub tenant_id: Option<String>,
    pub status_filter: Option<String>,
}

fn status_label(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "open",
        TicketStatus::Acknowledged => "acknowledged",
        TicketStatus::RemediationInProgress => "remediation_in_progress",
        TicketStatus::Deferred => "deferred",
        TicketStatus::AcceptedRisk => "accepted_risk",
        TicketStatus::Escalated => "escalated",
        TicketStatus::Resolved => "resolved",
    }
}

/// Create or update a ticket from system intelligence.
pub async fn intake_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TicketIntakeRequest>,
) -> Result<Json<IntakeResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    let settings = &state.settings.psa;

    if payload.evidence.len() > settings.max_evidence_per_ticket {
        return Err(ApiError::too_large("evidence_too_large"));
    }
    if payload.risk_score < settings.risk_threshold {
        return Ok(Json(IntakeResponse {
            status: "suppressed".to_string(),
            ticket_id: None,
            message: Some("risk_below_threshold".to_string()),
        }));
    }

    let now = Utc::now();
    let priority = compute_priority(
        payload.risk_score,
        payload.asset_criticality,
        payload.exposure_level,
        payload.time_sensitivity,
    );
    let sla_deadline = compute_sla_deadline(priority, now);

    let existing = state.psa.find_by_source(
        &payload.tenant_id,
        &payload.asset_id,
        payload.source_type,
        &payload.source_reference_id,
    );

    let ticket = if let Some(mut ticket) = existing {
        let reopened = ticket.status == TicketStatus::Resolved;
        ticket.risk_score = payload.risk_score;
        ticket.priority = priority;
        ticket.sla_deadline = sla_deadline;
        ticket.last_updated_at = now;
        if reopened {
            ticket.status = TicketStatus::Open;
        }
        if payload.system_recommendation.is_some() {
            ticket.system_recommendation = payload.system_recommendation.clone();
        }
        state.psa.update_ticket(ticket.clone());
        if reopened {
            state.psa.record_action(ActionRecord {
                action_id: Uuid::new_v4(),
                ticket_id: ticket.ticket_id,
                action_type: ActionType::Acknowledge,
                actor_identity: "system".to_string(),
                timestamp: now,
                justification: Some("reopened_by_new_evidence".to_string()),
                automation_request_id: None,
            });
        }
        ticket
    } else {
        let ticket = TicketRecord {
            ticket_id: Uuid::new_v4(),
            tenant_id: payload.tenant_id.clone(),
            source_type: payload.source_type,
            source_reference_id: payload.source_reference_id.clone(),
            asset_id: payload.asset_id.clone(),
            risk_score: payload.risk_score,
            priority,
            status: TicketStatus::Open,
            assigned_to: None,
            sla_deadline,
            creation_timestamp: now,
            last_updated_at: now,
            system_recommendation: payload.system_recommendation.clone(),
        };
        state.psa.record_ticket(ticket.clone());
        ticket
    };

    // Evidence is content-addressed; replays of the same object are dropped.
    let mut existing_hashes = state.psa.evidence_hashes(ticket.ticket_id);
    for evidence in &payload.evidence {
        let evidence_hash = build_evidence_hash(evidence);
        if existing_hashes.contains(&evidence_hash) {
            continue;
        }
        state.psa.record_evidence(EvidenceRecord {
            evidence_id: Uuid::new_v4(),
            ticket_id: ticket.ticket_id,
            linked_object_type: evidence.linked_object_type,
            linked_object_id: evidence.linked_object_id.clone(),
            immutable_reference: evidence.immutable_reference.clone(),
            hash_sha256: evidence_hash.clone(),
            captured_at: now,
            payload: evidence.payload.clone(),
        });
        existing_hashes.insert(evidence_hash);
    }
    state
        .psa
        .trim_evidence(ticket.ticket_id, settings.max_evidence_per_ticket);

    Ok(Json(IntakeResponse {
        status: "recorded".to_string(),
        ticket_id: Some(ticket.ticket_id),
        message: None,
    }))
}

/// Resolve a ticket from upstream system intelligence.
pub async fn resolve_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResolveRequest>,
) -> Result<Json<IntakeResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;

    let Some(mut ticket) = state.psa.find_by_source(
        &payload.tenant_id,
        &payload.asset_id,
        payload.source_type,
        &payload.source_reference_id,
    ) else {
        return Ok(Json(IntakeResponse {
            status: "ignored".to_string(),
            ticket_id: None,
            message: Some("ticket_not_found".to_string()),
        }));
    };
    if ticket.status == TicketStatus::Resolved {
        return Ok(Json(IntakeResponse {
            status: "ignored".to_string(),
            ticket_id: Some(ticket.ticket_id),
            message: Some("already_resolved".to_string()),
        }));
    }

    let now = payload.resolved_at;
    ticket.status = TicketStatus::Resolved;
    ticket.last_updated_at = now;
    state.psa.update_ticket(ticket.clone());
    state.psa.record_action(ActionRecord {
        action_id: Uuid::new_v4(),
        ticket_id: ticket.ticket_id,
        action_type: ActionType::Acknowledge,
        actor_identity: "system".to_string(),
        timestamp: now,
        justification: Some(
            payload
                .resolution_note
                .unwrap_or_else(|| "resolved_upstream".to_string()),
        ),
        automation_request_id: None,
    });
    state
        .psa
        .trim_actions(ticket.ticket_id, state.settings.psa.max_actions_per_ticket);

    Ok(Json(IntakeResponse {
        status: "resolved".to_string(),
        ticket_id: Some(ticket.ticket_id),
        message: None,
    }))
}

/// Return the ticket queue sorted by priority and SLA deadline.
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketListQuery>,
) -> Json<TicketListResponse> {
    let mut tickets = state.psa.list_tickets();
    if let Some(tenant_id) = &query.tenant_id {
        tickets.retain(|ticket| &ticket.tenant_id == tenant_id);
    }
    if let Some(status) = &query.status_filter {
        tickets.retain(|ticket| status_label(ticket.status) == status);
    }
    tickets.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then(a.sla_deadline.cmp(&b.sla_deadline))
    });
    Json(TicketListResponse { tickets })
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = state
        .psa
        .get_ticket(ticket_id)
        .ok_or_else(|| ApiError::not_found("ticket_not_found"))?;
    Ok(Json(TicketResponse {
        status: "ok".to_string(),
        ticket,
    }))
}

/// Record a human action for a ticket.
pub async fn record_action(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ActionRequest>,
) -> Result<Json<ActionListResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;

    let mut ticket = state
        .psa
        .get_ticket(ticket_id)
        .ok_or_else(|| ApiError::not_found("ticket_not_found"))?;
    if ticket.status == TicketStatus::Resolved {
        return Err(ApiError::conflict("ticket_resolved"));
    }
    if payload.action_type.requires_justification()
        && payload
            .justification
            .as_deref()
            .map_or(true, |justification| justification.trim().is_empty())
    {
        return Err(ApiError::unprocessable("justification_required"));
    }

    let now = Utc::now();
    state.psa.record_action(ActionRecord {
        action_id: Uuid::new_v4(),
        ticket_id: ticket.ticket_id,
        action_type: payload.action_type,
        actor_identity: payload.actor_identity,
        timestamp: now,
        justification: payload.justification,
        automation_request_id: payload.automation_request_id,
    });

    ticket.status = payload.action_type.target_status();
    ticket.last_updated_at = now;
    state.psa.update_ticket(ticket.clone());
    state
        .psa
        .trim_actions(ticket.ticket_id, state.settings.psa.max_actions_per_ticket);

    Ok(Json(ActionListResponse {
        actions: state.psa.list_actions(ticket_id),
    }))
}

pub async fn list_actions(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Json<ActionListResponse> {
    Json(ActionListResponse {
        actions: state.psa.list_actions(ticket_id),
    })
}

pub async fn list_evidence(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Json<EvidenceListResponse> {
    Json(EvidenceListResponse {
        evidence: state.psa.list_evidence(ticket_id),
    })
}
