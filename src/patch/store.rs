//! Patch Store
//! Mission: Registries for detections, policies, plans, evidence, asset state
//!
//! One lock guards everything: recording an execution outcome touches the
//! plan, the evidence ledger, and the asset state together, and either all
//! of them change or none do.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::{
    AssetPatchState, DetectionBatch, EvidenceRecord, ExecutionPlan, PatchPolicy, PlanStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStoreError {
    DetectionExists,
    PolicyExists,
    PlanExists,
    EvidenceExists,
}

impl PatchStoreError {
    pub fn code(self) -> &'static str {
        match self {
            PatchStoreError::DetectionExists => "detection_exists",
            PatchStoreError::PolicyExists => "policy_exists",
            PatchStoreError::PlanExists => "plan_exists",
            PatchStoreError::EvidenceExists => "evidence_already_recorded",
        }
    }
}

#[derive(Default)]
struct PatchStateInner {
    detections: HashMap<Uuid, DetectionBatch>,
    policies: HashMap<Uuid, PatchPolicy>,
    plans: HashMap<Uuid, ExecutionPlan>,
    evidence: HashMap<Uuid, EvidenceRecord>,
    asset_states: HashMap<(String, String), AssetPatchState>,
}

/// In-memory patch orchestration store.
#[derive(Default)]
pub struct PatchStore {
    inner: RwLock<PatchStateInner>,
}

impl PatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_detection(&self, batch: DetectionBatch) -> Result<(), PatchStoreError> {
        let mut inner = self.inner.write();
        if inner.detections.contains_key(&batch.detection_id) {
            return Err(PatchStoreError::DetectionExists);
        }
        info!(
            detection_id = %batch.detection_id,
            asset_id = %batch.asset_id,
            patches = batch.patches.len(),
            "detection recorded"
        );
        inner.detections.insert(batch.detection_id, batch);
        Ok(())
    }

    pub fn get_detection(&self, detection_id: Uuid) -> Option<DetectionBatch> {
        self.inner.read().detections.get(&detection_id).cloned()
    }

    pub fn record_policy(&self, policy: PatchPolicy) -> Result<(), PatchStoreError> {
        let mut inner = self.inner.write();
        if inner.policies.contains_key(&policy.policy_id) {
            return Err(PatchStoreError::PolicyExists);
        }
        inner.policies.insert(policy.policy_id, policy);
        Ok(())
    }

    pub fn get_policy(&self, policy_id: Uuid) -> Option<PatchPolicy> {
        self.inner.read().policies.get(&policy_id).cloned()
    }

    pub fn record_plan(&self, plan: ExecutionPlan) -> Result<(), PatchStoreError> {
        let mut inner = self.inner.write();
        if inner.plans.contains_key(&plan.plan_id) {
            return Err(PatchStoreError::PlanExists);
        }
        inner.plans.insert(plan.plan_id, plan);
        Ok(())
    }

    pub fn get_plan(&self, plan_id: Uuid) -> Option<ExecutionPlan> {
        self.inner.read().plans.get(&plan_id).cloned()
    }

    /// Atomically record an execution outcome: plan status, immutable
    /// evidence, and (on failure) the asset block. Evidence is write-once.
    pub fn record_outcome(
        &self,
        plan: ExecutionPlan,
        evidence: EvidenceRecord,
    ) -> Result<(), PatchStoreError> {
        let mut inner = self.inner.write();
        if inner.evidence.contains_key(&evidence.plan_id) {
            return Err(PatchStoreError::EvidenceExists);
        }

        if plan.status == PlanStatus::Failed {
            let key = (plan.tenant_id.clone(), plan.asset_id.clone());
            warn!(
                tenant_id = %plan.tenant_id,
                asset_id = %plan.asset_id,
                plan_id = %plan.plan_id,
                "asset blocked after failed patch execution"
            );
            inner.asset_states.insert(
                key,
                AssetPatchState {
                    tenant_id: plan.tenant_id.clone(),
                    asset_id: plan.asset_id.clone(),
                    status: "patch_blocked".to_string(),
                    reason: Some("execution_or_verification_failed".to_string()),
                    recorded_at: Utc::now(),
                },
            );
        }

        inner.evidence.insert(evidence.plan_id, evidence);
        inner.plans.insert(plan.plan_id, plan);
        Ok(())
    }

    pub fn get_evidence(&self, plan_id: Uuid) -> Option<EvidenceRecord> {
        self.inner.read().evidence.get(&plan_id).cloned()
    }

    pub fn asset_state(&self, tenant_id: &str, asset_id: &str) -> Option<AssetPatchState> {
        self.inner
            .read()
            .asset_states
            .get(&(tenant_id.to_string(), asset_id.to_string()))
            .cloned()
    }

    /// Clear a block after manual remediation.
    pub fn unblock_asset(&self, tenant_id: &str, asset_id: &str) -> Option<AssetPatchState> {
        let mut inner = self.inner.write();
        let key = (tenant_id.to_string(), asset_id.to_string());
        let state = AssetPatchState {
            tenant_id: tenant_id.to_string(),
            asset_id: asset_id.to_string(),
            status: "normal".to_string(),
            reason: None,
            recorded_at: Utc::now(),
        };
        inner.asset_states.insert(key, state.clone());
        Some(state)
    }
}
