//! Evidence Hashing
//! Mission: Content-addressed dedup for ticket evidence

use serde_json::json;

use crate::security::canonical_hash;

use super::models::EvidenceInput;

/// Hash the evidence payload in canonical form.
///
/// Two submissions of the same linked object produce the same hash, which is
/// the dedup key within a ticket.
pub fn build_evidence_hash(evidence: &EvidenceInput) -> String {
    let sealed = json!({
        "linked_object_type": serde_json::to_value(evidence.linked_object_type)
            .unwrap_or(serde_json::Value::Null),
        "linked_object_id": evidence.linked_object_id,
        "immutable_reference": evidence.immutable_reference,
        "payload": evidence.payload.clone().unwrap_or_else(|| json!({})),
    });
    canonical_hash(&sealed)
}
