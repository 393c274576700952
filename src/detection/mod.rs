//! Detection & correlation: rule evaluation, suppression, findings.

pub mod api;
pub mod correlation;
pub mod engine;
pub mod explain;
pub mod models;
pub mod risk;
pub mod rules;
pub mod store;

pub use engine::evaluate_event;
pub use models::{
    ContextSnapshot, CorrelationGraph, Finding, FindingState, NormalisedEvent, RuleDefinition,
    RuleType, SuppressionDecision,
};
pub use store::DetectionStores;
