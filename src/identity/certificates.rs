//! Certificate Trust Store
//! Mission: Track client certificate fingerprints through issue and revoke

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Lifecycle record for a registered client certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub identity_id: String,
    pub fingerprint_sha256: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
}

/// Registry keyed by fingerprint. Revocation is monotonic: a revoked
/// certificate never transitions back and the first revocation wins.
#[derive(Default)]
pub struct CertificateRegistry {
    records: RwLock<HashMap<String, CertificateRecord>>,
}

impl CertificateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a certificate fingerprint for an identity.
    ///
    /// A revoked fingerprint stays revoked: re-registering it returns the
    /// existing record untouched.
    pub fn issue(
        &self,
        identity_id: &str,
        fingerprint_sha256: &str,
        expires_at: DateTime<Utc>,
    ) -> CertificateRecord {
        let mut records = self.records.write();
        if let Some(existing) = records.get(fingerprint_sha256) {
            if existing.revoked_at.is_some() {
                warn!(
                    fingerprint = fingerprint_sha256,
                    "refused to re-issue revoked fingerprint"
                );
                return existing.clone();
            }
        }
        let record = CertificateRecord {
            identity_id: identity_id.to_string(),
            fingerprint_sha256: fingerprint_sha256.to_string(),
            issued_at: Utc::now(),
            expires_at,
            revoked_at: None,
            revocation_reason: None,
        };
        records.insert(fingerprint_sha256.to_string(), record.clone());
        info!(identity_id, fingerprint = fingerprint_sha256, "certificate issued");
        record
    }

    /// Revoke a fingerprint. Returns the record, or None if unknown.
    pub fn revoke(&self, fingerprint: &str, reason: &str) -> Option<CertificateRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(fingerprint)?;
        if record.revoked_at.is_none() {
            record.revoked_at = Some(Utc::now());
            record.revocation_reason = Some(reason.to_string());
            warn!(fingerprint, reason, "certificate revoked");
        }
        Some(record.clone())
    }

    pub fn get(&self, fingerprint: &str) -> Option<CertificateRecord> {
        self.records.read().get(fingerprint).cloned()
    }

    pub fn is_known(&self, fingerprint: &str) -> bool {
        self.records.read().contains_key(fingerprint)
    }

    pub fn is_revoked(&self, fingerprint: &str) -> bool {
        self.records
            .read()
            .get(fingerprint)
            .is_some_and(|record| record.revoked_at.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_issue_and_lookup() {
        let registry = CertificateRegistry::new();
        registry.issue("agent-00000001", "aa11bb22", Utc::now() + Duration::days(30));

        assert!(registry.is_known("aa11bb22"));
        assert!(!registry.is_revoked("aa11bb22"));
        assert!(!registry.is_known("deadbeef"));
    }

    #[test]
    fn test_revoke_unknown_returns_none() {
        let registry = CertificateRegistry::new();
        assert!(registry.revoke("deadbeef", "compromised").is_none());
    }

    #[test]
    fn test_revocation_is_monotonic() {
        let registry = CertificateRegistry::new();
        registry.issue("agent-00000001", "aa11bb22", Utc::now() + Duration::days(30));

        let first = registry.revoke("aa11bb22", "key_compromise").unwrap();
        let first_revoked_at = first.revoked_at.unwrap();

        // A second revocation must not move the timestamp or reason.
        let second = registry.revoke("aa11bb22", "operator_error").unwrap();
        assert_eq!(second.revoked_at.unwrap(), first_revoked_at);
        assert_eq!(second.revocation_reason.as_deref(), Some("key_compromise"));
        assert!(registry.is_revoked("aa11bb22"));
    }

    #[test]
    fn test_revoked_fingerprint_cannot_transition_back() {
        let registry = CertificateRegistry::new();
        registry.issue("agent-00000001", "aa11bb22", Utc::now() + Duration::days(30));
        registry.revoke("aa11bb22", "rotation");

        // Re-registering the same fingerprint must not resurrect it.
        registry.issue("agent-00000001", "aa11bb22", Utc::now() + Duration::days(60));
        assert!(registry.is_revoked("aa11bb22"));
    }
}
