//! Agent Presence Tracking
//! Mission: Keep authoritative last-seen state for every checked-in agent

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Current state for a checked-in agent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub identity_id: String,
    pub hostname: String,
    pub os: String,
    pub last_seen_at: DateTime<Utc>,
    pub trust_state: String,
}

/// Presence projection with an online/offline verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPresence {
    pub identity_id: String,
    pub hostname: String,
    pub os: String,
    pub trust_state: String,
    pub last_seen_at: DateTime<Utc>,
    pub status: String,
}

/// Registry of agent states keyed by identity.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentState>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, identity_id: &str, hostname: &str, os: &str, trust_state: &str) {
        self.agents.write().insert(
            identity_id.to_string(),
            AgentState {
                identity_id: identity_id.to_string(),
                hostname: hostname.to_string(),
                os: os.to_string(),
                last_seen_at: Utc::now(),
                trust_state: trust_state.to_string(),
            },
        );
    }

    pub fn list_all(&self) -> Vec<AgentState> {
        let mut agents: Vec<AgentState> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.identity_id.cmp(&b.identity_id));
        agents
    }
}

/// Evaluate online/offline presence against a heartbeat threshold.
pub fn evaluate_presence(agents: &[AgentState], threshold_seconds: i64) -> Vec<AgentPresence> {
    let threshold = Duration::seconds(threshold_seconds);
    let now = Utc::now();
    agents
        .iter()
        .map(|agent| AgentPresence {
            identity_id: agent.identity_id.clone(),
            hostname: agent.hostname.clone(),
            os: agent.os.clone(),
            trust_state: agent.trust_state.clone(),
            last_seen_at: agent.last_seen_at,
            status: if now - agent.last_seen_at <= threshold {
                "online".to_string()
            } else {
                "offline".to_string()
            },
        })
        .collect()
}

/// Heartbeat event captured from a verified hello.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub event_id: String,
    pub agent_id: String,
    pub hostname: String,
    pub os: String,
    pub uptime_seconds: i64,
    pub trust_state: String,
    pub received_at: DateTime<Utc>,
}

/// Bounded FIFO log of recent heartbeats.
pub struct HeartbeatStore {
    retention: usize,
    events: RwLock<VecDeque<HeartbeatEvent>>,
}

impl HeartbeatStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            events: RwLock::new(VecDeque::new()),
        }
    }

    pub fn record(&self, event: HeartbeatEvent) {
        let mut events = self.events.write();
        events.push_back(event);
        while events.len() > self.retention {
            events.pop_front();
        }
    }

    pub fn list_recent(&self, limit: usize) -> Vec<HeartbeatEvent> {
        let events = self.events.read();
        events.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_state() {
        let registry = AgentRegistry::new();
        registry.upsert("agent-00000001", "web-01", "linux", "untrusted");
        registry.upsert("agent-00000001", "web-01", "linux", "trusted");

        let agents = registry.list_all();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].trust_state, "trusted");
    }

    #[test]
    fn test_presence_online_within_threshold() {
        let registry = AgentRegistry::new();
        registry.upsert("agent-00000001", "web-01", "linux", "trusted");

        let presence = evaluate_presence(&registry.list_all(), 120);
        assert_eq!(presence[0].status, "online");
    }

    #[test]
    fn test_presence_offline_past_threshold() {
        let stale = AgentState {
            identity_id: "agent-00000002".to_string(),
            hostname: "db-01".to_string(),
            os: "windows".to_string(),
            last_seen_at: Utc::now() - Duration::seconds(300),
            trust_state: "trusted".to_string(),
        };
        let presence = evaluate_presence(&[stale], 120);
        assert_eq!(presence[0].status, "offline");
    }

    #[test]
    fn test_heartbeat_retention() {
        let store = HeartbeatStore::new(2);
        for index in 0..4 {
            store.record(HeartbeatEvent {
                event_id: format!("evt-{index:08}"),
                agent_id: "agent-00000001".to_string(),
                hostname: "web-01".to_string(),
                os: "linux".to_string(),
                uptime_seconds: 100 + index,
                trust_state: "trusted".to_string(),
                received_at: Utc::now(),
            });
        }
        let recent = store.list_recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_id, "evt-00000003");
    }
}
