//! Policy Evaluation
//! Mission: Decide patch eligibility and resolve maintenance windows

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use tracing::warn;

use super::models::{EligibilityDecision, MaintenanceWindow, PatchMetadata, PatchPolicy};

/// Outcome of evaluating a detection batch against a policy.
#[derive(Debug, Clone)]
pub struct EligibilityResult {
    pub allowed: Vec<PatchMetadata>,
    pub decisions: Vec<EligibilityDecision>,
}

fn decision(patch_id: &str, status: &str, reason: &str) -> EligibilityDecision {
    EligibilityDecision {
        patch_id: patch_id.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
    }
}

/// Determine which patches are eligible under the policy.
///
/// Patches are evaluated in input order; the first matching rule wins:
/// superseded → excluded → category deferred → severity deferred → allowed.
pub fn evaluate_patches(policy: &PatchPolicy, patches: &[PatchMetadata]) -> EligibilityResult {
    let superseded = collect_superseded_ids(patches);
    let exclusions: HashSet<&str> = policy.exclusions.iter().map(String::as_str).collect();

    let mut allowed = Vec::new();
    let mut decisions = Vec::with_capacity(patches.len());
    for patch in patches {
        if superseded.contains(patch.patch_id.as_str()) {
            decisions.push(decision(&patch.patch_id, "deferred", "superseded"));
            continue;
        }
        if exclusions.contains(patch.patch_id.as_str()) {
            decisions.push(decision(&patch.patch_id, "excluded", "explicit_exclusion"));
            continue;
        }
        if !policy.deferred_categories.is_empty()
            && policy.deferred_categories.contains(&patch.category)
        {
            decisions.push(decision(&patch.patch_id, "deferred", "category_deferred"));
            continue;
        }
        if !policy.allowed_severities.is_empty()
            && !policy.allowed_severities.contains(&patch.severity)
        {
            decisions.push(decision(&patch.patch_id, "deferred", "severity_not_allowed"));
            continue;
        }
        allowed.push(patch.clone());
        decisions.push(decision(&patch.patch_id, "allowed", "policy_allowed"));
    }

    EligibilityResult { allowed, decisions }
}

fn collect_superseded_ids(patches: &[PatchMetadata]) -> HashSet<&str> {
    patches
        .iter()
        .flat_map(|patch| patch.supersedes.iter().map(String::as_str))
        .collect()
}

fn parse_start_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M").ok()
}

/// Calculate the next maintenance window start, if any.
///
/// Each window is resolved in its own timezone, scanning day offsets over a
/// two-week range; a window whose start has already passed today resolves to
/// its next configured day. The earliest candidate across windows wins,
/// returned in UTC.
pub fn next_maintenance_window(
    now: DateTime<Utc>,
    windows: &[MaintenanceWindow],
) -> Option<DateTime<Utc>> {
    let mut candidates: Vec<DateTime<Utc>> = Vec::new();

    for window in windows {
        let zone: Tz = match window.timezone.parse() {
            Ok(zone) => zone,
            Err(_) => {
                warn!(timezone = %window.timezone, "unknown maintenance window timezone");
                continue;
            }
        };
        let Some(start_time) = parse_start_time(&window.start_time) else {
            warn!(start_time = %window.start_time, "invalid maintenance window start");
            continue;
        };
        let local_now = now.with_timezone(&zone);

        for offset in 0..14i64 {
            let candidate_date = local_now.date_naive() + Duration::days(offset);
            let weekday = candidate_date.weekday().num_days_from_monday() as u8;
            if !window.days_of_week.contains(&weekday) {
                continue;
            }
            let naive_start = candidate_date.and_time(start_time);
            let Some(start) = zone.from_local_datetime(&naive_start).earliest() else {
                continue;
            };
            if start >= local_now {
                candidates.push(start.with_timezone(&Utc));
                break;
            }
        }
    }

    candidates.into_iter().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::models::{PatchCategory, PatchSeverity, RebootRule};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn make_patch(patch_id: &str, severity: PatchSeverity, category: PatchCategory) -> PatchMetadata {
        PatchMetadata {
            patch_id: patch_id.to_string(),
            vendor: "microsoft".to_string(),
            severity,
            category,
            affected_component: "os.kernel".to_string(),
            requires_reboot: false,
            release_date: Utc::now(),
            detection_timestamp: Utc::now(),
            supersedes: vec![],
        }
    }

    fn make_policy() -> PatchPolicy {
        PatchPolicy {
            policy_id: Uuid::new_v4(),
            name: "baseline".to_string(),
            version: "1".to_string(),
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_ids: vec![],
            allowed_severities: vec![PatchSeverity::Critical, PatchSeverity::High],
            deferred_categories: vec![PatchCategory::Feature],
            exclusions: vec!["KB-EXCLUDED".to_string()],
            reboot_rule: RebootRule::Deferred,
            retry_limit: 2,
            maintenance_windows: vec![],
            signed_by: "policy-signer".to_string(),
            signature: "c2lnbmVk".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pipeline_order_first_match_wins() {
        let policy = make_policy();
        let mut superseding = make_patch("KB-NEW", PatchSeverity::Critical, PatchCategory::Security);
        superseding.supersedes = vec!["KB-OLD".to_string()];
        let patches = vec![
            superseding,
            make_patch("KB-OLD", PatchSeverity::Critical, PatchCategory::Security),
            make_patch("KB-EXCLUDED", PatchSeverity::Critical, PatchCategory::Security),
            make_patch("KB-FEATURE", PatchSeverity::Critical, PatchCategory::Feature),
            make_patch("KB-LOW", PatchSeverity::Low, PatchCategory::Security),
            make_patch("KB-GOOD", PatchSeverity::High, PatchCategory::Security),
        ];

        let result = evaluate_patches(&policy, &patches);
        let by_id: std::collections::HashMap<&str, &EligibilityDecision> = result
            .decisions
            .iter()
            .map(|decision| (decision.patch_id.as_str(), decision))
            .collect();

        assert_eq!(by_id["KB-OLD"].reason, "superseded");
        assert_eq!(by_id["KB-EXCLUDED"].reason, "explicit_exclusion");
        assert_eq!(by_id["KB-FEATURE"].reason, "category_deferred");
        assert_eq!(by_id["KB-LOW"].reason, "severity_not_allowed");
        assert_eq!(by_id["KB-GOOD"].reason, "policy_allowed");
        assert_eq!(result.allowed.len(), 2);
    }

    #[test]
    fn test_empty_severity_list_allows_all_severities() {
        let mut policy = make_policy();
        policy.allowed_severities.clear();
        let patches = vec![make_patch("KB-LOW", PatchSeverity::Low, PatchCategory::Security)];
        let result = evaluate_patches(&policy, &patches);
        assert_eq!(result.allowed.len(), 1);
    }

    fn utc_window() -> MaintenanceWindow {
        MaintenanceWindow {
            window_id: Uuid::new_v4(),
            timezone: "UTC".to_string(),
            start_time: "02:00".to_string(),
            end_time: "04:00".to_string(),
            days_of_week: vec![0], // Monday
        }
    }

    #[test]
    fn test_next_window_sunday_night_resolves_to_monday() {
        // Sunday 2024-03-03 23:00 UTC → Monday 2024-03-04 02:00 UTC.
        let now = Utc.with_ymd_and_hms(2024, 3, 3, 23, 0, 0).unwrap();
        let next = next_maintenance_window(now, &[utc_window()]).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_window_start_in_past_rolls_to_next_week() {
        // Monday 03:00, after the 02:00 start: next Monday.
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 3, 0, 0).unwrap();
        let next = next_maintenance_window(now, &[utc_window()]).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_window_start_exactly_now_is_selected() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap();
        let next = next_maintenance_window(now, &[utc_window()]).unwrap();
        assert_eq!(next, now);
    }

    #[test]
    fn test_earliest_window_across_timezones_wins() {
        let mut berlin = utc_window();
        berlin.timezone = "Europe/Berlin".to_string();
        berlin.days_of_week = vec![0, 1, 2, 3, 4, 5, 6];
        let mut utc = utc_window();
        utc.days_of_week = vec![0, 1, 2, 3, 4, 5, 6];

        // Berlin 02:00 is 01:00 UTC in winter, so it comes first.
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let next = next_maintenance_window(now, &[utc, berlin]).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 11, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_no_windows_returns_none() {
        assert!(next_maintenance_window(Utc::now(), &[]).is_none());
    }

    #[test]
    fn test_unknown_timezone_skipped() {
        let mut bad = utc_window();
        bad.timezone = "Mars/Olympus".to_string();
        assert!(next_maintenance_window(Utc::now(), &[bad]).is_none());
    }
}
