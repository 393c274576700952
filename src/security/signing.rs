//! HMAC Request Signing
//! Mission: Verify signed agent payloads with TTL and constant-time checks

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::SigningSettings;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a signature can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFailure {
    MissingSharedKey,
    Expired,
    InvalidEncoding,
    Mismatch,
}

impl SignatureFailure {
    /// Stable machine-readable rejection code.
    pub fn reason(&self) -> &'static str {
        match self {
            SignatureFailure::MissingSharedKey => "missing_shared_key",
            SignatureFailure::Expired => "signature_expired",
            SignatureFailure::InvalidEncoding => "invalid_signature_encoding",
            SignatureFailure::Mismatch => "signature_mismatch",
        }
    }
}

/// Canonical representation of payload bytes for signing.
fn normalise_payload(payload: &[u8]) -> &[u8] {
    let start = payload
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(payload.len());
    let end = payload
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |position| position + 1);
    &payload[start..end]
}

fn signing_message(payload: &[u8], timestamp: i64) -> Vec<u8> {
    let mut message = format!("{timestamp}.").into_bytes();
    message.extend_from_slice(normalise_payload(payload));
    message
}

/// Produce a base64 HMAC-SHA256 signature for a payload.
pub fn sign_payload(shared_key: &str, payload: &[u8], timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(shared_key.as_bytes())
        .map_err(|e| anyhow!("HMAC key error: {}", e))?;
    mac.update(&signing_message(payload, timestamp));
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verify a base64-encoded HMAC signature with TTL checks.
pub fn verify_signature(
    settings: &SigningSettings,
    payload: &[u8],
    signature_b64: &str,
    timestamp: i64,
) -> Result<(), SignatureFailure> {
    if settings.hmac_shared_key.is_empty() {
        return Err(SignatureFailure::MissingSharedKey);
    }

    let now = Utc::now().timestamp();
    if (now - timestamp).abs() > settings.signature_ttl_seconds {
        return Err(SignatureFailure::Expired);
    }

    let provided = BASE64
        .decode(signature_b64)
        .map_err(|_| SignatureFailure::InvalidEncoding)?;

    let mut mac = HmacSha256::new_from_slice(settings.hmac_shared_key.as_bytes())
        .map_err(|_| SignatureFailure::MissingSharedKey)?;
    mac.update(&signing_message(payload, timestamp));
    mac.verify_slice(&provided)
        .map_err(|_| SignatureFailure::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> SigningSettings {
        SigningSettings {
            hmac_shared_key: "unit-test-shared-key".to_string(),
            signature_ttl_seconds: 120,
        }
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let settings = test_settings();
        let payload = br#"{"asset_id":"asset-01234567"}"#;
        let timestamp = Utc::now().timestamp();

        let signature = sign_payload(&settings.hmac_shared_key, payload, timestamp).unwrap();
        assert!(verify_signature(&settings, payload, &signature, timestamp).is_ok());
    }

    #[test]
    fn test_whitespace_padding_is_normalised() {
        let settings = test_settings();
        let timestamp = Utc::now().timestamp();
        let signature =
            sign_payload(&settings.hmac_shared_key, b"{\"a\":1}", timestamp).unwrap();

        // Agents may send trailing newlines; the signed form strips them.
        assert!(verify_signature(&settings, b"  {\"a\":1}\n", &signature, timestamp).is_ok());
    }

    #[test]
    fn test_expired_timestamp_rejected() {
        let settings = test_settings();
        let payload = b"{}";
        let stale = Utc::now().timestamp() - 121;
        let signature = sign_payload(&settings.hmac_shared_key, payload, stale).unwrap();

        assert_eq!(
            verify_signature(&settings, payload, &signature, stale),
            Err(SignatureFailure::Expired)
        );
    }

    #[test]
    fn test_missing_shared_key() {
        let settings = SigningSettings {
            hmac_shared_key: String::new(),
            signature_ttl_seconds: 120,
        };
        assert_eq!(
            verify_signature(&settings, b"{}", "c2ln", Utc::now().timestamp()),
            Err(SignatureFailure::MissingSharedKey)
        );
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let settings = test_settings();
        assert_eq!(
            verify_signature(&settings, b"{}", "not base64!!", Utc::now().timestamp()),
            Err(SignatureFailure::InvalidEncoding)
        );
    }

    #[test]
    fn test_wrong_key_mismatch() {
        let settings = test_settings();
        let timestamp = Utc::now().timestamp();
        let signature = sign_payload("some-other-key", b"{}", timestamp).unwrap();
        assert_eq!(
            verify_signature(&settings, b"{}", &signature, timestamp),
            Err(SignatureFailure::Mismatch)
        );
    }

    #[test]
    fn test_tampered_payload_mismatch() {
        let settings = test_settings();
        let timestamp = Utc::now().timestamp();
        let signature = sign_payload(&settings.hmac_shared_key, b"{\"a\":1}", timestamp).unwrap();
        assert_eq!(
            verify_signature(&settings, b"{\"a\":2}", &signature, timestamp),
            Err(SignatureFailure::Mismatch)
        );
    }
}
