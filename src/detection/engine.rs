//! Rule Engine
//! Mission: Evaluate events against the active rule set into findings
//!
//! Evaluation order per rule: trigger match → context presence → variant
//! match → maintenance-window suppression → allowlists → dedup/supersede →
//! emit. Every suppression is persisted for audit.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::DetectionSettings;

use super::correlation::build_correlation_graph;
use super::explain::render_explanation;
use super::models::{ContextSnapshot, Finding, FindingState, NormalisedEvent, RuleDefinition, RuleType};
use super::risk::{boost_severity, compute_confidence};
use super::store::{AdmitOutcome, DetectionStores};

fn within_window(event_time: DateTime<Utc>, max_age_seconds: i64) -> bool {
    event_time >= Utc::now() - Duration::seconds(max_age_seconds)
}

fn trigger_matches(rule: &RuleDefinition, event: &NormalisedEvent) -> bool {
    rule.trigger_event_types.is_empty()
        || rule.trigger_event_types.contains(&event.event_type)
}

fn context_satisfies(rule: &RuleDefinition, context: Option<&ContextSnapshot>) -> bool {
    if rule.required_context.is_empty() {
        return true;
    }
    let Some(context) = context else {
        return false;
    };
    rule.required_context.iter().all(|key| match key.as_str() {
        "asset" => context.asset.is_some(),
        "identity" => context.identity.is_some(),
        "baseline" => context.baseline.is_some(),
        "patch_state" => context.patch_state.is_some(),
        _ => false,
    })
}

fn numeric_attribute(event: &NormalisedEvent, key: &str) -> Option<f64> {
    match event.attributes.get(key)? {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.parse::<f64>().ok(),
        _ => None,
    }
}

fn threshold_matches(rule: &RuleDefinition, event: &NormalisedEvent) -> bool {
    let (Some(attribute), Some(threshold)) =
        (rule.threshold_attribute.as_deref(), rule.threshold_value)
    else {
        return false;
    };
    numeric_attribute(event, attribute).is_some_and(|value| value >= threshold)
}

/// Find the ordered sequence of supporting events, trigger first.
fn sequence_matches(
    rule: &RuleDefinition,
    event: &NormalisedEvent,
    recent: &[NormalisedEvent],
    window_seconds: i64,
) -> Option<Vec<NormalisedEvent>> {
    let sequence = &rule.sequence_event_types;
    if sequence.is_empty() || sequence.last().map(String::as_str) != Some(&event.event_type) {
        return None;
    }

    let window_start = event.occurred_at - Duration::seconds(window_seconds);
    let prior: Vec<&NormalisedEvent> = recent
        .iter()
        .filter(|candidate| {
            candidate.occurred_at >= window_start
                && candidate.occurred_at <= event.occurred_at
                && candidate.asset_id == event.asset_id
                && candidate.identity_id == event.identity_id
        })
        .collect();

    let mut supporting = vec![event.clone()];
    for expected in &sequence[..sequence.len() - 1] {
        let matched = prior
            .iter()
            .find(|candidate| candidate.event_type == *expected)?;
        supporting.push((*matched).clone());
    }
    Some(supporting)
}

fn deviation_matches(rule: &RuleDefinition, event: &NormalisedEvent, context: &ContextSnapshot) -> bool {
    let (Some(baseline), Some(multiplier)) = (context.baseline.as_ref(), rule.deviation_multiplier)
    else {
        return false;
    };
    numeric_attribute(event, "metric_value")
        .is_some_and(|value| value >= baseline.baseline_value * multiplier)
}

fn cross_domain_matches(context: &ContextSnapshot) -> bool {
    context
        .patch_state
        .as_ref()
        .is_some_and(|patch_state| !patch_state.missing_patches.is_empty())
}

/// Evaluate an event against all active rules and return new findings.
pub fn evaluate_event(
    event: &NormalisedEvent,
    context: Option<&ContextSnapshot>,
    settings: &DetectionSettings,
    stores: &DetectionStores,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    if !within_window(event.occurred_at, settings.max_event_age_seconds) {
        return findings;
    }

    let recent = stores.events.list_recent();

    for rule in stores.rules.list() {
        if !rule.enabled {
            continue;
        }
        if !trigger_matches(&rule, event) {
            continue;
        }
        if !context_satisfies(&rule, context) && !settings.allow_findings_without_context {
            continue;
        }

        let time_window = rule
            .time_window_seconds
            .unwrap_or(settings.correlation_time_window_seconds);

        let mut supporting = vec![event.clone()];
        match rule.rule_type {
            RuleType::Boolean => {}
            RuleType::Threshold => {
                if !threshold_matches(&rule, event) {
                    continue;
                }
            }
            RuleType::Sequence => {
                match sequence_matches(&rule, event, &recent, time_window) {
                    Some(matched) => supporting = matched,
                    None => continue,
                }
            }
            RuleType::BehaviouralDeviation => {
                let Some(context) = context else { continue };
                if !deviation_matches(&rule, event, context) {
                    continue;
                }
            }
            RuleType::CrossDomain => {
                let Some(context) = context else { continue };
                if !cross_domain_matches(context) {
                    continue;
                }
            }
        }

        let Some(context) = context else { continue };

        if context.maintenance_window {
            stores.suppressions.record(
                &rule.rule_id,
                &event.event_id,
                &event.asset_id,
                &event.identity_id,
                "maintenance_window",
            );
            continue;
        }
        if rule.suppression.allowlist_assets.contains(&event.asset_id) {
            stores.suppressions.record(
                &rule.rule_id,
                &event.event_id,
                &event.asset_id,
                &event.identity_id,
                "asset_allowlist",
            );
            continue;
        }
        if rule
            .suppression
            .allowlist_identities
            .contains(&event.identity_id)
        {
            stores.suppressions.record(
                &rule.rule_id,
                &event.event_id,
                &event.asset_id,
                &event.identity_id,
                "identity_allowlist",
            );
            continue;
        }
        if rule
            .suppression
            .allowlist_event_types
            .contains(&event.event_type)
        {
            stores.suppressions.record(
                &rule.rule_id,
                &event.event_id,
                &event.asset_id,
                &event.identity_id,
                "event_type_allowlist",
            );
            continue;
        }

        let explanation = render_explanation(
            &rule,
            event,
            context,
            &settings.allowed_explanation_variables,
            time_window,
        );
        let finding = Finding {
            finding_id: Uuid::new_v4(),
            finding_type: rule.rule_id.clone(),
            severity: boost_severity(&rule.output.severity, context),
            confidence_score: compute_confidence(rule.output.confidence_base, context),
            asset_id: event.asset_id.clone(),
            identity_id: event.identity_id.clone(),
            supporting_events: supporting
                .iter()
                .map(|supporting_event| supporting_event.event_id.clone())
                .take(settings.max_supporting_events)
                .collect(),
            correlation_graph: build_correlation_graph(&supporting),
            context_snapshot: Some(context.clone()),
            explanation_text: explanation,
            creation_timestamp: Utc::now(),
            state: FindingState::Open,
            superseded_by: None,
        };

        match stores
            .findings
            .admit(finding.clone(), rule.suppression.dedupe_window_seconds)
        {
            AdmitOutcome::Created { .. } => {
                findings.push(finding);
                if findings.len() >= settings.max_findings_per_request {
                    break;
                }
            }
            AdmitOutcome::DuplicateOpen => {
                stores.suppressions.record(
                    &rule.rule_id,
                    &event.event_id,
                    &event.asset_id,
                    &event.identity_id,
                    "duplicate_open_finding",
                );
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::detection::models::{
        AssetContext, BaselineContext, IdentityContext, PatchStateContext, RuleOutput,
        SuppressionConfig,
    };
    use std::collections::HashMap;

    fn settings() -> DetectionSettings {
        Settings::from_env().detection
    }

    fn stores() -> DetectionStores {
        DetectionStores::new(1000, 1000)
    }

    fn make_event(event_id: &str, event_type: &str, occurred_at: DateTime<Utc>) -> NormalisedEvent {
        NormalisedEvent {
            event_id: event_id.to_string(),
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            identity_id: "user-00000001".to_string(),
            event_type: event_type.to_string(),
            occurred_at,
            received_at: occurred_at,
            attributes: HashMap::new(),
            network_flow: None,
            process_lineage: None,
        }
    }

    fn full_context() -> ContextSnapshot {
        ContextSnapshot {
            asset: Some(AssetContext {
                asset_id: "asset-01234567".to_string(),
                criticality: "low".to_string(),
                exposure: "internal".to_string(),
            }),
            identity: Some(IdentityContext {
                identity_id: "user-00000001".to_string(),
                privileged: false,
            }),
            baseline: None,
            patch_state: None,
            maintenance_window: false,
        }
    }

    fn sequence_rule() -> RuleDefinition {
        RuleDefinition {
            rule_id: "rule-seq".to_string(),
            rule_type: RuleType::Sequence,
            trigger_event_types: vec!["network.egress".to_string()],
            sequence_event_types: vec!["process.spawn".to_string(), "network.egress".to_string()],
            time_window_seconds: Some(300),
            required_context: vec!["asset".to_string(), "identity".to_string()],
            deviation_multiplier: None,
            threshold_attribute: None,
            threshold_value: None,
            suppression: SuppressionConfig::default(),
            output: RuleOutput {
                severity: "medium".to_string(),
                confidence_base: 0.6,
                explanation_template: "{event_type} on {asset_id}".to_string(),
            },
            enabled: true,
        }
    }

    #[test]
    fn test_sequence_rule_end_to_end() {
        let stores = stores();
        stores.rules.add(sequence_rule());
        let start = Utc::now() - Duration::seconds(60);

        let spawn = make_event("evt-spawn", "process.spawn", start);
        stores.events.add(spawn.clone());
        assert!(evaluate_event(&spawn, Some(&full_context()), &settings(), &stores).is_empty());

        let egress = make_event("evt-egress", "network.egress", start + Duration::seconds(60));
        stores.events.add(egress.clone());
        let findings = evaluate_event(&egress, Some(&full_context()), &settings(), &stores);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.severity, "medium");
        assert!(finding.supporting_events.contains(&"evt-egress".to_string()));
        assert!(finding.supporting_events.contains(&"evt-spawn".to_string()));
    }

    #[test]
    fn test_sequence_out_of_window_skipped() {
        let stores = stores();
        stores.rules.add(sequence_rule());

        let spawn = make_event(
            "evt-spawn",
            "process.spawn",
            Utc::now() - Duration::seconds(400),
        );
        stores.events.add(spawn);

        let egress = make_event("evt-egress", "network.egress", Utc::now());
        stores.events.add(egress.clone());
        let findings = evaluate_event(&egress, Some(&full_context()), &settings(), &stores);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_sequence_requires_same_identity() {
        let stores = stores();
        stores.rules.add(sequence_rule());

        let mut spawn = make_event("evt-spawn", "process.spawn", Utc::now());
        spawn.identity_id = "user-99999999".to_string();
        stores.events.add(spawn);

        let egress = make_event("evt-egress", "network.egress", Utc::now());
        stores.events.add(egress.clone());
        assert!(evaluate_event(&egress, Some(&full_context()), &settings(), &stores).is_empty());
    }

    #[test]
    fn test_maintenance_window_suppresses_and_audits() {
        let stores = stores();
        let mut rule = sequence_rule();
        rule.rule_type = RuleType::Boolean;
        rule.trigger_event_types = vec!["process.spawn".to_string()];
        rule.sequence_event_types.clear();
        stores.rules.add(rule);

        let mut context = full_context();
        context.maintenance_window = true;
        let event = make_event("evt-1", "process.spawn", Utc::now());
        let findings = evaluate_event(&event, Some(&context), &settings(), &stores);

        assert!(findings.is_empty());
        let suppressions = stores.suppressions.list();
        assert_eq!(suppressions.len(), 1);
        assert_eq!(suppressions[0].reason, "maintenance_window");
    }

    #[test]
    fn test_allowlisted_asset_suppressed() {
        let stores = stores();
        let mut rule = sequence_rule();
        rule.rule_type = RuleType::Boolean;
        rule.trigger_event_types = vec!["process.spawn".to_string()];
        rule.sequence_event_types.clear();
        rule.suppression.allowlist_assets = vec!["asset-01234567".to_string()];
        stores.rules.add(rule);

        let event = make_event("evt-1", "process.spawn", Utc::now());
        assert!(evaluate_event(&event, Some(&full_context()), &settings(), &stores).is_empty());
        assert_eq!(stores.suppressions.list()[0].reason, "asset_allowlist");
    }

    #[test]
    fn test_duplicate_open_finding_suppressed() {
        let stores = stores();
        let mut rule = sequence_rule();
        rule.rule_type = RuleType::Boolean;
        rule.trigger_event_types = vec!["process.spawn".to_string()];
        rule.sequence_event_types.clear();
        stores.rules.add(rule);

        let first = make_event("evt-1", "process.spawn", Utc::now());
        assert_eq!(
            evaluate_event(&first, Some(&full_context()), &settings(), &stores).len(),
            1
        );

        let second = make_event("evt-2", "process.spawn", Utc::now());
        assert!(evaluate_event(&second, Some(&full_context()), &settings(), &stores).is_empty());
        assert!(stores
            .suppressions
            .list()
            .iter()
            .any(|decision| decision.reason == "duplicate_open_finding"));
    }

    #[test]
    fn test_behavioural_deviation_rule() {
        let stores = stores();
        let mut rule = sequence_rule();
        rule.rule_id = "rule-dev".to_string();
        rule.rule_type = RuleType::BehaviouralDeviation;
        rule.trigger_event_types = vec!["telemetry.metric".to_string()];
        rule.sequence_event_types.clear();
        rule.deviation_multiplier = Some(3.0);
        rule.required_context = vec!["baseline".to_string()];
        stores.rules.add(rule);

        let mut context = full_context();
        context.baseline = Some(BaselineContext {
            metric_name: "cpu.total.percent".to_string(),
            baseline_value: 10.0,
        });

        let mut event = make_event("evt-1", "telemetry.metric", Utc::now());
        event
            .attributes
            .insert("metric_value".to_string(), serde_json::Value::from(95.0));
        assert_eq!(evaluate_event(&event, Some(&context), &settings(), &stores).len(), 1);

        // Below the multiplier no finding is produced.
        let mut quiet = make_event("evt-2", "telemetry.metric", Utc::now());
        quiet
            .attributes
            .insert("metric_value".to_string(), serde_json::Value::from(20.0));
        quiet.asset_id = "asset-89abcdef".to_string();
        assert!(evaluate_event(&quiet, Some(&context), &settings(), &stores).is_empty());
    }

    #[test]
    fn test_cross_domain_requires_missing_patches() {
        let stores = stores();
        let mut rule = sequence_rule();
        rule.rule_id = "rule-xd".to_string();
        rule.rule_type = RuleType::CrossDomain;
        rule.trigger_event_types = vec!["network.ingress".to_string()];
        rule.sequence_event_types.clear();
        rule.required_context = vec!["patch_state".to_string()];
        stores.rules.add(rule);

        let event = make_event("evt-1", "network.ingress", Utc::now());

        let mut patched = full_context();
        patched.patch_state = Some(PatchStateContext {
            missing_patches: vec![],
        });
        assert!(evaluate_event(&event, Some(&patched), &settings(), &stores).is_empty());

        let mut unpatched = full_context();
        unpatched.patch_state = Some(PatchStateContext {
            missing_patches: vec!["KB5034441".to_string()],
        });
        assert_eq!(evaluate_event(&event, Some(&unpatched), &settings(), &stores).len(), 1);
    }

    #[test]
    fn test_threshold_rule() {
        let stores = stores();
        let mut rule = sequence_rule();
        rule.rule_id = "rule-thr".to_string();
        rule.rule_type = RuleType::Threshold;
        rule.trigger_event_types = vec!["auth.failure".to_string()];
        rule.sequence_event_types.clear();
        rule.required_context = vec![];
        rule.threshold_attribute = Some("failure_count".to_string());
        rule.threshold_value = Some(5.0);
        stores.rules.add(rule);

        let mut event = make_event("evt-1", "auth.failure", Utc::now());
        event
            .attributes
            .insert("failure_count".to_string(), serde_json::Value::from(7));
        assert_eq!(
            evaluate_event(&event, Some(&full_context()), &settings(), &stores).len(),
            1
        );
    }

    #[test]
    fn test_stale_event_ignored() {
        let stores = stores();
        stores.rules.add(sequence_rule());
        let stale = make_event(
            "evt-1",
            "network.egress",
            Utc::now() - Duration::seconds(4000),
        );
        assert!(evaluate_event(&stale, Some(&full_context()), &settings(), &stores).is_empty());
    }
}
