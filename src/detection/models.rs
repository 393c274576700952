//! Detection domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Closed set of rule types; each variant carries its own validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Boolean,
    Threshold,
    Sequence,
    BehaviouralDeviation,
    CrossDomain,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuppressionConfig {
    #[serde(default)]
    pub allowlist_assets: Vec<String>,
    #[serde(default)]
    pub allowlist_identities: Vec<String>,
    #[serde(default)]
    pub allowlist_event_types: Vec<String>,
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window_seconds: i64,
}

fn default_dedupe_window() -> i64 {
    900
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutput {
    pub severity: String,
    pub confidence_base: f64,
    pub explanation_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub trigger_event_types: Vec<String>,
    #[serde(default)]
    pub sequence_event_types: Vec<String>,
    pub time_window_seconds: Option<i64>,
    #[serde(default)]
    pub required_context: Vec<String>,
    pub deviation_multiplier: Option<f64>,
    pub threshold_attribute: Option<String>,
    pub threshold_value: Option<f64>,
    #[serde(default)]
    pub suppression: SuppressionConfig,
    pub output: RuleOutput,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkFlow {
    pub destination: String,
    pub port: Option<u16>,
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLineage {
    pub process_name: String,
    pub parent_process: Option<String>,
    pub command_line: Option<String>,
}

/// Event shape consumed by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalisedEvent {
    pub event_id: String,
    pub tenant_id: String,
    pub asset_id: String,
    pub identity_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    pub network_flow: Option<NetworkFlow>,
    pub process_lineage: Option<ProcessLineage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetContext {
    pub asset_id: String,
    pub criticality: String,
    pub exposure: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityContext {
    pub identity_id: String,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineContext {
    pub metric_name: String,
    pub baseline_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchStateContext {
    #[serde(default)]
    pub missing_patches: Vec<String>,
}

/// Context resolved by upstream services and attached to an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub asset: Option<AssetContext>,
    pub identity: Option<IdentityContext>,
    pub baseline: Option<BaselineContext>,
    pub patch_state: Option<PatchStateContext>,
    #[serde(default)]
    pub maintenance_window: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: String,
    pub node_type: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
}

/// Entity graph linking an event to its asset, identity, and artefacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingState {
    Open,
    Dismissed,
    Superseded,
}

/// A rule-triggered security observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: Uuid,
    pub finding_type: String,
    pub severity: String,
    pub confidence_score: f64,
    pub asset_id: String,
    pub identity_id: String,
    pub supporting_events: Vec<String>,
    pub correlation_graph: CorrelationGraph,
    pub context_snapshot: Option<ContextSnapshot>,
    pub explanation_text: String,
    pub creation_timestamp: DateTime<Utc>,
    pub state: FindingState,
    pub superseded_by: Option<Uuid>,
}

/// Audit record for a suppressed rule hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionDecision {
    pub decision_id: Uuid,
    pub rule_id: String,
    pub event_id: String,
    pub asset_id: String,
    pub identity_id: String,
    pub reason: String,
    pub suppressed_at: DateTime<Utc>,
}
