//! PSA Store
//! Mission: Ticket, action, and evidence state under one serialisation point

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

use super::models::{ActionRecord, EvidenceRecord, SourceType, TicketRecord};

#[derive(Default)]
struct PsaStateInner {
    tickets: HashMap<Uuid, TicketRecord>,
    actions: HashMap<Uuid, Vec<ActionRecord>>,
    evidence: HashMap<Uuid, Vec<EvidenceRecord>>,
}

/// In-memory PSA workflow store.
#[derive(Default)]
pub struct PsaStore {
    inner: RwLock<PsaStateInner>,
}

impl PsaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a ticket by its dedup tuple.
    pub fn find_by_source(
        &self,
        tenant_id: &str,
        asset_id: &str,
        source_type: SourceType,
        source_reference_id: &str,
    ) -> Option<TicketRecord> {
        self.inner
            .read()
            .tickets
            .values()
            .find(|ticket| {
                ticket.tenant_id == tenant_id
                    && ticket.asset_id == asset_id
                    && ticket.source_type == source_type
                    && ticket.source_reference_id == source_reference_id
            })
            .cloned()
    }

    pub fn record_ticket(&self, ticket: TicketRecord) {
        info!(
            ticket_id = %ticket.ticket_id,
            priority = ?ticket.priority,
            asset_id = %ticket.asset_id,
            "ticket recorded"
        );
        self.inner.write().tickets.insert(ticket.ticket_id, ticket);
    }

    pub fn update_ticket(&self, ticket: TicketRecord) -> bool {
        let mut inner = self.inner.write();
        if !inner.tickets.contains_key(&ticket.ticket_id) {
            return false;
        }
        inner.tickets.insert(ticket.ticket_id, ticket);
        true
    }

    pub fn get_ticket(&self, ticket_id: Uuid) -> Option<TicketRecord> {
        self.inner.read().tickets.get(&ticket_id).cloned()
    }

    pub fn list_tickets(&self) -> Vec<TicketRecord> {
        self.inner.read().tickets.values().cloned().collect()
    }

    pub fn record_action(&self, action: ActionRecord) {
        self.inner
            .write()
            .actions
            .entry(action.ticket_id)
            .or_default()
            .push(action);
    }

    pub fn list_actions(&self, ticket_id: Uuid) -> Vec<ActionRecord> {
        self.inner
            .read()
            .actions
            .get(&ticket_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn record_evidence(&self, evidence: EvidenceRecord) {
        self.inner
            .write()
            .evidence
            .entry(evidence.ticket_id)
            .or_default()
            .push(evidence);
    }

    pub fn list_evidence(&self, ticket_id: Uuid) -> Vec<EvidenceRecord> {
        self.inner
            .read()
            .evidence
            .get(&ticket_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn evidence_hashes(&self, ticket_id: Uuid) -> HashSet<String> {
        self.inner
            .read()
            .evidence
            .get(&ticket_id)
            .map(|records| {
                records
                    .iter()
                    .map(|record| record.hash_sha256.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// FIFO retention: keep the newest `limit` actions.
    pub fn trim_actions(&self, ticket_id: Uuid, limit: usize) {
        let mut inner = self.inner.write();
        if let Some(actions) = inner.actions.get_mut(&ticket_id) {
            let excess = actions.len().saturating_sub(limit);
            if excess > 0 {
                actions.drain(0..excess);
            }
        }
    }

    /// FIFO retention: keep the newest `limit` evidence records.
    pub fn trim_evidence(&self, ticket_id: Uuid, limit: usize) {
        let mut inner = self.inner.write();
        if let Some(evidence) = inner.evidence.get_mut(&ticket_id) {
            let excess = evidence.len().saturating_sub(limit);
            if excess > 0 {
                evidence.drain(0..excess);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psa::models::{ActionType, LinkedObjectType, PriorityLevel, TicketStatus};
    use chrono::Utc;

    fn make_ticket() -> TicketRecord {
        TicketRecord {
            ticket_id: Uuid::new_v4(),
            tenant_id: "tenant-aabbccdd".to_string(),
            source_type: SourceType::Finding,
            source_reference_id: "finding-00000001".to_string(),
            asset_id: "asset-01234567".to_string(),
            risk_score: 90.0,
            priority: PriorityLevel::P1,
            status: TicketStatus::Open,
            assigned_to: None,
            sla_deadline: Utc::now(),
            creation_timestamp: Utc::now(),
            last_updated_at: Utc::now(),
            system_recommendation: None,
        }
    }

    #[test]
    fn test_find_by_source_tuple() {
        let store = PsaStore::new();
        let ticket = make_ticket();
        store.record_ticket(ticket.clone());

        let found = store
            .find_by_source(
                "tenant-aabbccdd",
                "asset-01234567",
                SourceType::Finding,
                "finding-00000001",
            )
            .unwrap();
        assert_eq!(found.ticket_id, ticket.ticket_id);

        assert!(store
            .find_by_source(
                "tenant-aabbccdd",
                "asset-01234567",
                SourceType::Vulnerability,
                "finding-00000001",
            )
            .is_none());
    }

    #[test]
    fn test_update_requires_existing() {
        let store = PsaStore::new();
        let ticket = make_ticket();
        assert!(!store.update_ticket(ticket.clone()));
        store.record_ticket(ticket.clone());
        assert!(store.update_ticket(ticket));
    }

    #[test]
    fn test_action_trim_keeps_newest() {
        let store = PsaStore::new();
        let ticket = make_ticket();
        store.record_ticket(ticket.clone());
        for index in 0..5 {
            store.record_action(ActionRecord {
                action_id: Uuid::new_v4(),
                ticket_id: ticket.ticket_id,
                action_type: ActionType::Acknowledge,
                actor_identity: format!("analyst-{index:08}"),
                timestamp: Utc::now(),
                justification: None,
                automation_request_id: None,
            });
        }
        store.trim_actions(ticket.ticket_id, 2);
        let actions = store.list_actions(ticket.ticket_id);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].actor_identity, "analyst-00000003");
    }

    #[test]
    fn test_evidence_hash_set() {
        let store = PsaStore::new();
        let ticket = make_ticket();
        store.record_ticket(ticket.clone());
        store.record_evidence(EvidenceRecord {
            evidence_id: Uuid::new_v4(),
            ticket_id: ticket.ticket_id,
            linked_object_type: LinkedObjectType::Finding,
            linked_object_id: "finding-00000001".to_string(),
            immutable_reference: "ref-1".to_string(),
            hash_sha256: "abc123".to_string(),
            captured_at: Utc::now(),
            payload: None,
        });
        assert!(store.evidence_hashes(ticket.ticket_id).contains("abc123"));
    }
}
