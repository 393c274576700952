//! Rule Validation & Defaults
//! Mission: Reject misconfigured rules at install time, not evaluation time

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use crate::gateway::ApiError;

use super::models::{RuleDefinition, RuleOutput, RuleType, SuppressionConfig};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("invalid placeholder pattern");
}

fn extract_placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|capture| capture[1].to_string())
        .collect()
}

/// Validate rule configuration to ensure deterministic behaviour.
pub fn validate_rule_definition(
    rule: &RuleDefinition,
    allowed_explanation_variables: &[String],
) -> Result<(), ApiError> {
    match rule.rule_type {
        RuleType::Sequence => {
            if rule.sequence_event_types.is_empty() {
                return Err(ApiError::bad_request("sequence_requires_event_types"));
            }
            if rule.time_window_seconds.is_none() {
                return Err(ApiError::bad_request("sequence_requires_time_window"));
            }
        }
        RuleType::BehaviouralDeviation => {
            if rule.deviation_multiplier.is_none() {
                return Err(ApiError::bad_request("deviation_requires_multiplier"));
            }
        }
        RuleType::CrossDomain => {
            if !rule.required_context.iter().any(|key| key == "patch_state") {
                return Err(ApiError::bad_request("cross_domain_requires_patch_state"));
            }
        }
        RuleType::Threshold => {
            if rule.threshold_attribute.is_none() || rule.threshold_value.is_none() {
                return Err(ApiError::bad_request("threshold_requires_attribute"));
            }
        }
        RuleType::Boolean => {}
    }

    let placeholders = extract_placeholders(&rule.output.explanation_template);
    let invalid: Vec<String> = placeholders
        .into_iter()
        .filter(|name| !allowed_explanation_variables.iter().any(|ok| ok == name))
        .collect();
    if !invalid.is_empty() {
        return Err(ApiError::bad_request(format!(
            "invalid_explanation_variables:{}",
            invalid.join(",")
        )));
    }
    Ok(())
}

/// Built-in rules installed at startup.
pub fn default_rules() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            rule_id: "rule-brute-force-sequence".to_string(),
            rule_type: RuleType::Sequence,
            trigger_event_types: vec!["auth.success".to_string()],
            sequence_event_types: vec!["auth.failure".to_string(), "auth.success".to_string()],
            time_window_seconds: Some(600),
            required_context: vec!["asset".to_string(), "identity".to_string()],
            deviation_multiplier: None,
            threshold_attribute: None,
            threshold_value: None,
            suppression: SuppressionConfig::default(),
            output: RuleOutput {
                severity: "high".to_string(),
                confidence_base: 0.7,
                explanation_template:
                    "Successful login on {asset_id} by {identity_id} after repeated failures"
                        .to_string(),
            },
            enabled: true,
        },
        RuleDefinition {
            rule_id: "rule-egress-after-spawn".to_string(),
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
                explanation_template:
                    "Process {process_name} opened egress to {network_destination} on {asset_id}"
                        .to_string(),
            },
            enabled: true,
        },
        RuleDefinition {
            rule_id: "rule-metric-deviation".to_string(),
            rule_type: RuleType::BehaviouralDeviation,
            trigger_event_types: vec!["telemetry.metric".to_string()],
            sequence_event_types: vec![],
            time_window_seconds: None,
            required_context: vec!["asset".to_string(), "baseline".to_string()],
            deviation_multiplier: Some(3.0),
            threshold_attribute: None,
            threshold_value: None,
            suppression: SuppressionConfig::default(),
            output: RuleOutput {
                severity: "medium".to_string(),
                confidence_base: 0.5,
                explanation_template:
                    "{metric_name} at {metric_value} exceeds baseline {baseline_value} x{multiplier}"
                        .to_string(),
            },
            enabled: true,
        },
        RuleDefinition {
            rule_id: "rule-unpatched-exposure".to_string(),
            rule_type: RuleType::CrossDomain,
            trigger_event_types: vec!["network.ingress".to_string()],
            sequence_event_types: vec![],
            time_window_seconds: None,
            required_context: vec!["asset".to_string(), "patch_state".to_string()],
            deviation_multiplier: None,
            threshold_attribute: None,
            threshold_value: None,
            suppression: SuppressionConfig::default(),
            output: RuleOutput {
                severity: "high".to_string(),
                confidence_base: 0.65,
                explanation_template:
                    "Inbound traffic to {asset_id} with missing patches: {missing_patches}"
                        .to_string(),
            },
            enabled: true,
        },
    ]
}
