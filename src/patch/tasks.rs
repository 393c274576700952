//! Task Manifest Generation
//! Mission: Deterministic remote-execution tasks for an approved plan

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::models::{ExecutionPlan, TaskDefinition, TaskManifest};

/// Create a task manifest from an execution plan.
///
/// Task ids are derived from the plan id plus the execution sequence so the
/// same plan always yields the same manifest, which keeps dispatch auditable.
pub fn build_task_manifest(plan: &ExecutionPlan, issued_by: &str) -> TaskManifest {
    let now = Utc::now();
    let expires_at = now + Duration::minutes(30);

    let tasks = plan
        .execution_order
        .iter()
        .enumerate()
        .map(|(index, patch_id)| TaskDefinition {
            task_id: derive_task_id(plan.plan_id, index as u128 + 1),
            issued_by: issued_by.to_string(),
            policy_reference: plan.policy_id.to_string(),
            execution_context: "system".to_string(),
            interpreter: "bash".to_string(),
            command_payload: format!("apply-patch --id {patch_id}"),
            expires_at,
        })
        .collect();

    TaskManifest {
        plan_id: plan.plan_id,
        tenant_id: plan.tenant_id.clone(),
        asset_id: plan.asset_id.clone(),
        issued_at: now,
        tasks,
    }
}

fn derive_task_id(plan_id: Uuid, sequence: u128) -> Uuid {
    Uuid::from_u128(plan_id.as_u128().wrapping_add(sequence))
}
