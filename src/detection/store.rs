//! Detection Stores
//! Mission: Bounded event buffer, rule registry, findings, suppression audit

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use tracing::info;
use uuid::Uuid;

use super::models::{
    Finding, FindingState, NormalisedEvent, RuleDefinition, SuppressionDecision,
};

/// FIFO buffer of recent normalised events used for sequence matching.
pub struct EventBuffer {
    retention: usize,
    events: RwLock<VecDeque<NormalisedEvent>>,
}

impl EventBuffer {
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            events: RwLock::new(VecDeque::new()),
        }
    }

    pub fn add(&self, event: NormalisedEvent) {
        let mut events = self.events.write();
        events.push_back(event);
        while events.len() > self.retention {
            events.pop_front();
        }
    }

    pub fn list_recent(&self) -> Vec<NormalisedEvent> {
        self.events.read().iter().cloned().collect()
    }
}

/// Registry for detection rules keyed by rule id.
#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<Vec<RuleDefinition>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, rule: RuleDefinition) {
        let mut rules = self.rules.write();
        rules.retain(|existing| existing.rule_id != rule.rule_id);
        rules.push(rule);
    }

    pub fn list(&self) -> Vec<RuleDefinition> {
        self.rules.read().clone()
    }

    pub fn get(&self, rule_id: &str) -> Option<RuleDefinition> {
        self.rules
            .read()
            .iter()
            .find(|rule| rule.rule_id == rule_id)
            .cloned()
    }
}

/// Outcome of offering a new finding to the store.
#[derive(Debug)]
pub enum AdmitOutcome {
    /// Finding stored; if a stale open duplicate existed it is now superseded.
    Created { superseded: Option<Uuid> },
    /// An open duplicate exists inside the dedup window.
    DuplicateOpen,
}

/// Findings with lifecycle state and bounded retention.
///
/// `admit` performs the find-duplicate / supersede / insert step under one
/// lock, which is the serialisation point the dedup invariant needs when two
/// events race on the same (rule, asset, identity) key.
pub struct FindingStore {
    retention: usize,
    findings: Mutex<VecDeque<Finding>>,
}

impl FindingStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            findings: Mutex::new(VecDeque::new()),
        }
    }

    pub fn admit(&self, finding: Finding, dedupe_window_seconds: i64) -> AdmitOutcome {
        let mut findings = self.findings.lock();

        let duplicate = findings.iter_mut().find(|existing| {
            existing.state == FindingState::Open
                && existing.finding_type == finding.finding_type
                && existing.asset_id == finding.asset_id
                && existing.identity_id == finding.identity_id
        });

        let mut superseded = None;
        if let Some(existing) = duplicate {
            let window_elapsed = finding.creation_timestamp
                >= existing.creation_timestamp + Duration::seconds(dedupe_window_seconds);
            if !window_elapsed {
                return AdmitOutcome::DuplicateOpen;
            }
            existing.state = FindingState::Superseded;
            existing.superseded_by = Some(finding.finding_id);
            superseded = Some(existing.finding_id);
        }

        info!(
            finding_id = %finding.finding_id,
            rule_id = %finding.finding_type,
            asset_id = %finding.asset_id,
            "finding created"
        );
        findings.push_front(finding);
        while findings.len() > self.retention {
            findings.pop_back();
        }
        AdmitOutcome::Created { superseded }
    }

    pub fn list(&self, state: Option<FindingState>) -> Vec<Finding> {
        self.findings
            .lock()
            .iter()
            .filter(|finding| state.map_or(true, |wanted| finding.state == wanted))
            .cloned()
            .collect()
    }

    pub fn get(&self, finding_id: Uuid) -> Option<Finding> {
        self.findings
            .lock()
            .iter()
            .find(|finding| finding.finding_id == finding_id)
            .cloned()
    }

    pub fn dismiss(&self, finding_id: Uuid) -> Option<Finding> {
        let mut findings = self.findings.lock();
        let finding = findings
            .iter_mut()
            .find(|finding| finding.finding_id == finding_id)?;
        finding.state = FindingState::Dismissed;
        Some(finding.clone())
    }

    pub fn find_open_by_key(
        &self,
        rule_id: &str,
        asset_id: &str,
        identity_id: &str,
    ) -> Option<Finding> {
        self.findings
            .lock()
            .iter()
            .find(|finding| {
                finding.state == FindingState::Open
                    && finding.finding_type == rule_id
                    && finding.asset_id == asset_id
                    && finding.identity_id == identity_id
            })
            .cloned()
    }
}

/// Suppression decisions kept for audit.
#[derive(Default)]
pub struct SuppressionLog {
    decisions: RwLock<Vec<SuppressionDecision>>,
}

impl SuppressionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        rule_id: &str,
        event_id: &str,
        asset_id: &str,
        identity_id: &str,
        reason: &str,
    ) -> SuppressionDecision {
        let decision = SuppressionDecision {
            decision_id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            event_id: event_id.to_string(),
            asset_id: asset_id.to_string(),
            identity_id: identity_id.to_string(),
            reason: reason.to_string(),
            suppressed_at: Utc::now(),
        };
        self.decisions.write().push(decision.clone());
        decision
    }

    pub fn list(&self) -> Vec<SuppressionDecision> {
        self.decisions.read().clone()
    }
}

/// All detection-side stores, constructed once at startup.
pub struct DetectionStores {
    pub events: EventBuffer,
    pub rules: RuleRegistry,
    pub findings: FindingStore,
    pub suppressions: SuppressionLog,
}

impl DetectionStores {
    pub fn new(event_retention: usize, finding_retention: usize) -> Self {
        Self {
            events: EventBuffer::new(event_retention),
            rules: RuleRegistry::new(),
            findings: FindingStore::new(finding_retention),
            suppressions: SuppressionLog::new(),
        }
    }
}
