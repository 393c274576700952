//! Patch domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchSeverity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl PatchSeverity {
    /// Deterministic execution rank: critical patches run first.
    pub fn rank(self) -> u8 {
        match self {
            PatchSeverity::Critical => 0,
            PatchSeverity::High => 1,
            PatchSeverity::Medium => 2,
            PatchSeverity::Low => 3,
            PatchSeverity::Unknown => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchCategory {
    Security,
    Critical,
    Optional,
    Feature,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootRule {
    Immediate,
    Deferred,
    MaintenanceWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    InstallFailure,
    Timeout,
    RebootFailure,
    PostCheckFailure,
    Unknown,
}

/// Normalised patch metadata captured by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchMetadata {
    pub patch_id: String,
    pub vendor: String,
    pub severity: PatchSeverity,
    pub category: PatchCategory,
    pub affected_component: String,
    pub requires_reboot: bool,
    pub release_date: DateTime<Utc>,
    pub detection_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub supersedes: Vec<String>,
}

/// Batch of patch detections for a specific asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub detection_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub identity_id: String,
    pub detected_at: DateTime<Utc>,
    pub patches: Vec<PatchMetadata>,
}

/// Maintenance window definition (tenant-local time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub window_id: Uuid,
    pub timezone: String,
    pub start_time: String,
    pub end_time: String,
    pub days_of_week: Vec<u8>,
}

/// Signed policy that governs patch eligibility and scheduling.
///
/// Policies are immutable: a revision is a new policy_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPolicy {
    pub policy_id: Uuid,
    pub name: String,
    pub version: String,
    pub tenant_id: String,
    #[serde(default)]
    pub asset_ids: Vec<String>,
    #[serde(default)]
    pub allowed_severities: Vec<PatchSeverity>,
    #[serde(default)]
    pub deferred_categories: Vec<PatchCategory>,
    #[serde(default)]
    pub exclusions: Vec<String>,
    pub reboot_rule: RebootRule,
    pub retry_limit: u32,
    #[serde(default)]
    pub maintenance_windows: Vec<MaintenanceWindow>,
    pub signed_by: String,
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub patch_id: String,
    pub status: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlanRequest {
    pub plan_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub detection_id: Uuid,
    pub policy_id: Uuid,
    pub requested_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub policy_id: Uuid,
    pub detection_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub reboot_rule: RebootRule,
    pub status: PlanStatus,
    pub execution_order: Vec<String>,
    pub pre_checks: Vec<String>,
    pub post_checks: Vec<String>,
    pub rollback_plan: Vec<String>,
    pub eligibility: Vec<EligibilityDecision>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub patch_id: String,
    pub status: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub failure_type: Option<FailureType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResultRequest {
    pub tenant_id: String,
    pub asset_id: String,
    pub plan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ExecutionResult>,
    pub reboot_confirmed: bool,
    pub verification_status: VerificationStatus,
    pub verification_notes: Option<String>,
}

/// Current patch state for an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPatchState {
    pub tenant_id: String,
    pub asset_id: String,
    pub status: String,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Immutable snapshot bundle recording why an outcome occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub plan_id: Uuid,
    pub detection_snapshot: DetectionBatch,
    pub policy_snapshot: PatchPolicy,
    pub plan_snapshot: ExecutionPlan,
    pub results: Vec<ExecutionResult>,
    pub reboot_confirmed: bool,
    pub verification_status: VerificationStatus,
    pub verification_notes: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub evidence_hash: String,
}

/// A deterministic task derived from an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_id: Uuid,
    pub issued_by: String,
    pub policy_reference: String,
    pub execution_context: String,
    pub interpreter: String,
    pub command_payload: String,
    pub expires_at: DateTime<Utc>,
}

/// Collection of tasks for a single execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskManifest {
    pub plan_id: Uuid,
    pub tenant_id: String,
    pub asset_id: String,
    pub issued_at: DateTime<Utc>,
    pub tasks: Vec<TaskDefinition>,
}
