//! Explanation Rendering
//! Mission: Human-readable finding text from a whitelisted variable set

use super::models::{ContextSnapshot, NormalisedEvent, RuleDefinition};

fn attribute_text(event: &NormalisedEvent, key: &str) -> Option<String> {
    event.attributes.get(key).map(|value| match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}

/// Render the rule's explanation template.
///
/// Only variables on the allowlist are substituted; templates are validated
/// at install time so unknown placeholders cannot reach this point.
pub fn render_explanation(
    rule: &RuleDefinition,
    event: &NormalisedEvent,
    context: &ContextSnapshot,
    allowed_variables: &[String],
    time_window: i64,
) -> String {
    let baseline_value = context
        .baseline
        .as_ref()
        .map(|baseline| baseline.baseline_value.to_string());
    let missing_patches = context
        .patch_state
        .as_ref()
        .filter(|patch_state| !patch_state.missing_patches.is_empty())
        .map(|patch_state| patch_state.missing_patches.join(", "));
    let network_destination = event
        .network_flow
        .as_ref()
        .map(|flow| flow.destination.clone());
    let process_name = event
        .process_lineage
        .as_ref()
        .map(|lineage| lineage.process_name.clone());

    let variables: Vec<(&str, String)> = vec![
        ("event_type", event.event_type.clone()),
        ("asset_id", event.asset_id.clone()),
        ("identity_id", event.identity_id.clone()),
        (
            "metric_name",
            attribute_text(event, "metric_name").unwrap_or_else(|| "metric".to_string()),
        ),
        (
            "metric_value",
            attribute_text(event, "metric_value").unwrap_or_else(|| "unknown".to_string()),
        ),
        (
            "baseline_value",
            baseline_value.unwrap_or_else(|| "unknown".to_string()),
        ),
        ("time_window", time_window.to_string()),
        (
            "multiplier",
            rule.deviation_multiplier.unwrap_or(0.0).to_string(),
        ),
        (
            "missing_patches",
            missing_patches.unwrap_or_else(|| "none".to_string()),
        ),
        (
            "network_destination",
            network_destination.unwrap_or_else(|| "unknown".to_string()),
        ),
        (
            "process_name",
            process_name.unwrap_or_else(|| "unknown".to_string()),
        ),
    ];

    let mut rendered = rule.output.explanation_template.clone();
    for (name, value) in variables {
        if allowed_variables.iter().any(|allowed| allowed == name) {
            rendered = rendered.replace(&format!("{{{name}}}"), &value);
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::detection::models::{
        BaselineContext, NetworkFlow, RuleOutput, RuleType, SuppressionConfig,
    };
    use chrono::Utc;
    use std::collections::HashMap;

    fn make_rule(template: &str) -> RuleDefinition {
        RuleDefinition {
            rule_id: "rule-test".to_string(),
            rule_type: RuleType::Boolean,
            trigger_event_types: vec![],
            sequence_event_types: vec![],
            time_window_seconds: None,
            required_context: vec![],
            deviation_multiplier: Some(3.0),
            threshold_attribute: None,
            threshold_value: None,
            suppression: SuppressionConfig::default(),
            output: RuleOutput {
                severity: "low".to_string(),
                confidence_base: 0.5,
                explanation_template: template.to_string(),
            },
            enabled: true,
        }
    }

    fn make_event() -> NormalisedEvent {
        let mut attributes = HashMap::new();
        attributes.insert(
            "metric_value".to_string(),
            serde_json::Value::from(95.0_f64),
        );
        attributes.insert(
            "metric_name".to_string(),
            serde_json::Value::from("cpu.total.percent"),
        );
        NormalisedEvent {
            event_id: "evt-1".to_string(),
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            identity_id: "user-00000001".to_string(),
            event_type: "telemetry.metric".to_string(),
            occurred_at: Utc::now(),
            received_at: Utc::now(),
            attributes,
            network_flow: Some(NetworkFlow {
                destination: "203.0.113.7".to_string(),
                port: None,
                protocol: None,
            }),
            process_lineage: None,
        }
    }

    fn allowed() -> Vec<String> {
        Settings::from_env().detection.allowed_explanation_variables
    }

    #[test]
    fn test_substitutes_event_and_context_variables() {
        let rule = make_rule("{metric_name} at {metric_value} vs {baseline_value} on {asset_id}");
        let context = ContextSnapshot {
            baseline: Some(BaselineContext {
                metric_name: "cpu.total.percent".to_string(),
                baseline_value: 10.0,
            }),
            ..ContextSnapshot::default()
        };
        let rendered = render_explanation(&rule, &make_event(), &context, &allowed(), 300);
        assert_eq!(rendered, "cpu.total.percent at 95.0 vs 10 on asset-01234567");
    }

    #[test]
    fn test_missing_context_falls_back_to_placeholders() {
        let rule = make_rule("{process_name} to {network_destination}, patches: {missing_patches}");
        let rendered = render_explanation(
            &rule,
            &make_event(),
            &ContextSnapshot::default(),
            &allowed(),
            0,
        );
        assert_eq!(rendered, "unknown to 203.0.113.7, patches: none");
    }

    #[test]
    fn test_unlisted_variable_left_untouched() {
        let rule = make_rule("{event_type} {secret}");
        let rendered = render_explanation(
            &rule,
            &make_event(),
            &ContextSnapshot::default(),
            &allowed(),
            0,
        );
        assert_eq!(rendered, "telemetry.metric {secret}");
    }
}
