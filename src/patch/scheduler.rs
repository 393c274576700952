//! Execution Plan Scheduling
//! Mission: Deterministic execution ordering and window placement

use chrono::Utc;
use uuid::Uuid;

use super::models::{ExecutionPlan, PatchMetadata, PatchPolicy, PlanStatus, RebootRule};
use super::policy::{next_maintenance_window, EligibilityResult};

/// Create an execution plan based on policy and eligibility results.
pub fn build_execution_plan(
    plan_id: Uuid,
    tenant_id: &str,
    asset_id: &str,
    policy: &PatchPolicy,
    detection_id: Uuid,
    eligibility: &EligibilityResult,
) -> ExecutionPlan {
    let now = Utc::now();
    let scheduled_for = if policy.reboot_rule == RebootRule::MaintenanceWindow {
        next_maintenance_window(now, &policy.maintenance_windows)
    } else {
        None
    };

    let ordered = order_patches(&eligibility.allowed);
    let execution_order = ordered.iter().map(|patch| patch.patch_id.clone()).collect();

    ExecutionPlan {
        plan_id,
        tenant_id: tenant_id.to_string(),
        asset_id: asset_id.to_string(),
        policy_id: policy.policy_id,
        detection_id,
        created_at: now,
        scheduled_for,
        reboot_rule: policy.reboot_rule,
        status: PlanStatus::Planned,
        execution_order,
        pre_checks: vec!["disk_space".to_string(), "service_health".to_string()],
        post_checks: vec![
            "reboot_state".to_string(),
            "service_health".to_string(),
            "patch_rescan".to_string(),
        ],
        rollback_plan: vec!["package_rollback".to_string(), "restore_point".to_string()],
        eligibility: eligibility.decisions.clone(),
    }
}

/// Sort patches by severity rank then release date. Total order: ties on
/// both keys fall back to patch id so two runs never disagree.
fn order_patches(patches: &[PatchMetadata]) -> Vec<PatchMetadata> {
    let mut ordered = patches.to_vec();
    ordered.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then(a.release_date.cmp(&b.release_date))
            .then(a.patch_id.cmp(&b.patch_id))
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::models::{EligibilityDecision, MaintenanceWindow, PatchCategory, PatchSeverity};
    use chrono::{DateTime, Duration, TimeZone};

    fn make_patch(patch_id: &str, severity: PatchSeverity, release: DateTime<Utc>) -> PatchMetadata {
        PatchMetadata {
            patch_id: patch_id.to_string(),
            vendor: "vendor".to_string(),
            severity,
            category: PatchCategory::Security,
            affected_component: "os".to_string(),
            requires_reboot: false,
            release_date: release,
            detection_timestamp: Utc::now(),
            supersedes: vec![],
        }
    }

    fn make_policy(reboot_rule: RebootRule, windows: Vec<MaintenanceWindow>) -> PatchPolicy {
        PatchPolicy {
            policy_id: Uuid::new_v4(),
            name: "baseline".to_string(),
            version: "1".to_string(),
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_ids: vec![],
            allowed_severities: vec![],
            deferred_categories: vec![],
            exclusions: vec![],
            reboot_rule,
            retry_limit: 0,
            maintenance_windows: windows,
            signed_by: "signer".to_string(),
            signature: "c2lnbmVk".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_execution_order_by_severity_then_release() {
        let old = Utc::now() - Duration::days(30);
        let new = Utc::now();
        let eligibility = EligibilityResult {
            allowed: vec![
                make_patch("KB-LOW", PatchSeverity::Low, old),
                make_patch("KB-CRIT-NEW", PatchSeverity::Critical, new),
                make_patch("KB-CRIT-OLD", PatchSeverity::Critical, old),
            ],
            decisions: vec![],
        };
        let policy = make_policy(RebootRule::Deferred, vec![]);
        let plan = build_execution_plan(
            Uuid::new_v4(),
            "tenant-aabbccdd",
            "asset-01234567",
            &policy,
            Uuid::new_v4(),
            &eligibility,
        );
        assert_eq!(plan.execution_order, vec!["KB-CRIT-OLD", "KB-CRIT-NEW", "KB-LOW"]);
        assert_eq!(plan.status, PlanStatus::Planned);
        assert!(plan.scheduled_for.is_none());
    }

    #[test]
    fn test_fixed_check_lists() {
        let policy = make_policy(RebootRule::Immediate, vec![]);
        let plan = build_execution_plan(
            Uuid::new_v4(),
            "tenant-aabbccdd",
            "asset-01234567",
            &policy,
            Uuid::new_v4(),
            &EligibilityResult {
                allowed: vec![],
                decisions: vec![EligibilityDecision {
                    patch_id: "KB-1".to_string(),
                    status: "deferred".to_string(),
                    reason: "superseded".to_string(),
                }],
            },
        );
        assert_eq!(plan.pre_checks, vec!["disk_space", "service_health"]);
        assert_eq!(plan.post_checks, vec!["reboot_state", "service_health", "patch_rescan"]);
        assert_eq!(plan.rollback_plan, vec!["package_rollback", "restore_point"]);
        assert_eq!(plan.eligibility.len(), 1);
    }

    #[test]
    fn test_maintenance_window_rule_sets_schedule() {
        let window = MaintenanceWindow {
            window_id: Uuid::new_v4(),
            timezone: "UTC".to_string(),
            start_time: "02:00".to_string(),
            end_time: "04:00".to_string(),
            days_of_week: vec![0, 1, 2, 3, 4, 5, 6],
        };
        let policy = make_policy(RebootRule::MaintenanceWindow, vec![window]);
        let plan = build_execution_plan(
            Uuid::new_v4(),
            "tenant-aabbccdd",
            "asset-01234567",
            &policy,
            Uuid::new_v4(),
            &EligibilityResult {
                allowed: vec![],
                decisions: vec![],
            },
        );
        let scheduled = plan.scheduled_for.expect("window must resolve");
        assert!(scheduled >= Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    }
}
