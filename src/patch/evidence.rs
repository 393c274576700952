//! Evidence Capture
//! Mission: Immutable, hash-sealed snapshots of every patch execution cycle

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::security::canonical_hash;

use super::models::{
    DetectionBatch, EvidenceRecord, ExecutionPlan, ExecutionResult, PatchPolicy,
    VerificationStatus,
};

/// Assemble immutable evidence of a patch execution cycle.
///
/// The evidence hash covers the canonical serialisation of the plan,
/// detection, policy, results, and verification metadata, so any later
/// mutation of the stored record is detectable.
#[allow(clippy::too_many_arguments)]
pub fn build_evidence(
    plan: &ExecutionPlan,
    detection: &DetectionBatch,
    policy: &PatchPolicy,
    results: &[ExecutionResult],
    reboot_confirmed: bool,
    verification_status: VerificationStatus,
    verification_notes: Option<&str>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> Result<EvidenceRecord> {
    let sealed = json!({
        "plan": serde_json::to_value(plan).context("plan snapshot")?,
        "detection": serde_json::to_value(detection).context("detection snapshot")?,
        "policy": serde_json::to_value(policy).context("policy snapshot")?,
        "results": serde_json::to_value(results).context("results snapshot")?,
        "reboot_confirmed": reboot_confirmed,
        "verification_status": serde_json::to_value(verification_status)?,
    });
    let evidence_hash = canonical_hash(&sealed);

    Ok(EvidenceRecord {
        plan_id: plan.plan_id,
        detection_snapshot: detection.clone(),
        policy_snapshot: policy.clone(),
        plan_snapshot: plan.clone(),
        results: results.to_vec(),
        reboot_confirmed,
        verification_status,
        verification_notes: verification_notes.map(|notes| notes.to_string()),
        started_at,
        finished_at,
        recorded_at: Utc::now(),
        evidence_hash,
    })
}

/// Recompute the hash of a stored record for integrity checks.
pub fn verify_evidence_hash(record: &EvidenceRecord) -> Result<bool> {
    let sealed = json!({
        "plan": serde_json::to_value(&record.plan_snapshot)?,
        "detection": serde_json::to_value(&record.detection_snapshot)?,
        "policy": serde_json::to_value(&record.policy_snapshot)?,
        "results": serde_json::to_value(&record.results)?,
        "reboot_confirmed": record.reboot_confirmed,
        "verification_status": serde_json::to_value(record.verification_status)?,
    });
    Ok(canonical_hash(&sealed) == record.evidence_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::models::{
        PatchCategory, PatchMetadata, PatchSeverity, PlanStatus, RebootRule,
    };
    use uuid::Uuid;

    fn fixtures() -> (ExecutionPlan, DetectionBatch, PatchPolicy) {
        let plan_id = Uuid::new_v4();
        let detection_id = Uuid::new_v4();
        let policy_id = Uuid::new_v4();
        let plan = ExecutionPlan {
            plan_id,
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            policy_id,
            detection_id,
            created_at: Utc::now(),
            scheduled_for: None,
            reboot_rule: RebootRule::Deferred,
            status: PlanStatus::Failed,
            execution_order: vec!["KB-1".to_string()],
            pre_checks: vec![],
            post_checks: vec![],
            rollback_plan: vec![],
            eligibility: vec![],
        };
        let detection = DetectionBatch {
            detection_id,
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            identity_id: "agent-00000001".to_string(),
            detected_at: Utc::now(),
            patches: vec![PatchMetadata {
                patch_id: "KB-1".to_string(),
                vendor: "vendor".to_string(),
                severity: PatchSeverity::Critical,
                category: PatchCategory::Security,
                affected_component: "os".to_string(),
                requires_reboot: true,
                release_date: Utc::now(),
                detection_timestamp: Utc::now(),
                supersedes: vec![],
            }],
        };
        let policy = PatchPolicy {
            policy_id,
            name: "baseline".to_string(),
            version: "1".to_string(),
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_ids: vec![],
            allowed_severities: vec![],
            deferred_categories: vec![],
            exclusions: vec![],
            reboot_rule: RebootRule::Deferred,
            retry_limit: 0,
            maintenance_windows: vec![],
            signed_by: "signer".to_string(),
            signature: "c2lnbmVk".to_string(),
            created_at: Utc::now(),
        };
        (plan, detection, policy)
    }

    #[test]
    fn test_hash_verifies_and_detects_tampering() {
        let (plan, detection, policy) = fixtures();
        let results = vec![ExecutionResult {
            patch_id: "KB-1".to_string(),
            status: "failed".to_string(),
            stdout: None,
            stderr: Some("dpkg: error".to_string()),
            exit_code: Some(1),
            failure_type: Some(crate::patch::models::FailureType::InstallFailure),
        }];
        let record = build_evidence(
            &plan,
            &detection,
            &policy,
            &results,
            true,
            VerificationStatus::Failed,
            None,
            Utc::now(),
            Utc::now(),
        )
        .unwrap();

        assert!(verify_evidence_hash(&record).unwrap());

        let mut tampered = record.clone();
        tampered.results[0].status = "completed".to_string();
        assert!(!verify_evidence_hash(&tampered).unwrap());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let (plan, detection, policy) = fixtures();
        let first = build_evidence(
            &plan, &detection, &policy, &[], false,
            VerificationStatus::Passed, None, Utc::now(), Utc::now(),
        )
        .unwrap();
        let second = build_evidence(
            &plan, &detection, &policy, &[], false,
            VerificationStatus::Passed, None, Utc::now(), Utc::now(),
        )
        .unwrap();
        assert_eq!(first.evidence_hash, second.evidence_hash);
    }
}
