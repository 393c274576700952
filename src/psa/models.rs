//! PSA domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Finding,
    PatchFailure,
    DefenceAction,
    Vulnerability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    P1,
    P2,
    P3,
    P4,
}

impl PriorityLevel {
    pub fn rank(self) -> u8 {
        match self {
            PriorityLevel::P1 => 1,
            PriorityLevel::P2 => 2,
            PriorityLevel::P3 => 3,
            PriorityLevel::P4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Acknowledged,
    RemediationInProgress,
    Deferred,
    AcceptedRisk,
    Escalated,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Acknowledge,
    Remediate,
    Defer,
    AcceptRisk,
    Escalate,
}

impl ActionType {
    /// Ticket status this action transitions to.
    pub fn target_status(self) -> TicketStatus {
        match self {
            ActionType::Acknowledge => TicketStatus::Acknowledged,
            ActionType::Remediate => TicketStatus::RemediationInProgress,
            ActionType::Defer => TicketStatus::Deferred,
            ActionType::AcceptRisk => TicketStatus::AcceptedRisk,
            ActionType::Escalate => TicketStatus::Escalated,
        }
    }

    /// Whether the action demands a human-supplied justification.
    pub fn requires_justification(self) -> bool {
        matches!(
            self,
            ActionType::Defer | ActionType::AcceptRisk | ActionType::Escalate
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCriticality {
    Low,
    Medium,
    High,
    MissionCritical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureLevel {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSensitivity {
    None,
    ExploitObserved,
    ActiveAttack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkedObjectType {
    Event,
    Finding,
    Vulnerability,
    Patch,
    DefenceAction,
}

/// Evidence payload supplied by upstream intelligence services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceInput {
    pub linked_object_type: LinkedObjectType,
    pub linked_object_id: String,
    pub immutable_reference: String,
    pub payload: Option<Value>,
}

/// Request body for ticket intake from system intelligence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketIntakeRequest {
    pub tenant_id: String,
    pub asset_id: String,
    pub source_type: SourceType,
    pub source_reference_id: String,
    pub risk_score: f64,
    pub asset_criticality: AssetCriticality,
    pub exposure_level: ExposureLevel,
    #[serde(default = "default_time_sensitivity")]
    pub time_sensitivity: TimeSensitivity,
    pub system_recommendation: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceInput>,
}

fn default_time_sensitivity() -> TimeSensitivity {
    TimeSensitivity::None
}

/// Stored ticket representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket_id: Uuid,
    pub tenant_id: String,
    pub source_type: SourceType,
    pub source_reference_id: String,
    pub asset_id: String,
    pub risk_score: f64,
    pub priority: PriorityLevel,
    pub status: TicketStatus,
    pub assigned_to: Option<String>,
    pub sla_deadline: DateTime<Utc>,
    pub creation_timestamp: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub system_recommendation: Option<String>,
}

/// Request body for recording a human action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_type: ActionType,
    pub actor_identity: String,
    pub justification: Option<String>,
    pub automation_request_id: Option<String>,
}

/// Stored action entry for a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: Uuid,
    pub ticket_id: Uuid,
    pub action_type: ActionType,
    pub actor_identity: String,
    pub timestamp: DateTime<Utc>,
    pub justification: Option<String>,
    pub automation_request_id: Option<String>,
}

/// Stored immutable evidence record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub evidence_id: Uuid,
    pub ticket_id: Uuid,
    pub linked_object_type: LinkedObjectType,
    pub linked_object_id: String,
    pub immutable_reference: String,
    pub hash_sha256: String,
    pub captured_at: DateTime<Utc>,
    pub payload: Option<Value>,
}

/// Request body to resolve a ticket upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub tenant_id: String,
    pub source_type: SourceType,
    pub source_reference_id: String,
    pub asset_id: String,
    pub resolved_at: DateTime<Utc>,
    pub resolution_note: Option<String>,
}
