//! Canonical JSON Encoding
//! Mission: Deterministic payload hashing that is stable across services
//!
//! Two services must compute identical hashes for the same semantic JSON
//! value, so the canonical form is fixed here: keys sorted lexicographically
//! at every depth, `,` and `:` separators with no whitespace, UTF-8 bytes,
//! SHA-256 hex digest. The default encoder is deliberately not used.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Encode a JSON value in canonical form.
pub fn canonical_encode(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// SHA-256 hex digest of the canonical encoding.
pub fn canonical_hash(value: &Value) -> String {
    let encoded = canonical_encode(value);
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        // serde_json's scalar rendering is already deterministic
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => {
            out.push_str(&serde_json::to_string(text).unwrap_or_default());
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let value = json!({
            "zulu": {"beta": 2, "alpha": 1},
            "alpha": [{"nested_z": true, "nested_a": false}],
        });
        let encoded = canonical_encode(&value);
        assert_eq!(
            encoded,
            r#"{"alpha":[{"nested_a":false,"nested_z":true}],"zulu":{"alpha":1,"beta":2}}"#
        );
    }

    #[test]
    fn test_no_whitespace_separators() {
        let value = json!({"a": [1, 2, 3], "b": "text"});
        let encoded = canonical_encode(&value);
        assert!(!encoded.contains(' '));
        assert_eq!(encoded, r#"{"a":[1,2,3],"b":"text"}"#);
    }

    #[test]
    fn test_hash_independent_of_insertion_order() {
        let first: serde_json::Value =
            serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(canonical_hash(&first), canonical_hash(&second));
    }

    #[test]
    fn test_hash_round_trip_stability() {
        let value = json!({"pid": "proc-01", "args": ["-a", "-b"], "elevated": true});
        let decoded: serde_json::Value =
            serde_json::from_str(&canonical_encode(&value)).unwrap();
        assert_eq!(canonical_hash(&decoded), canonical_hash(&value));
    }

    #[test]
    fn test_string_escaping() {
        let value = json!({"path": "C:\\Windows\\system32", "note": "line\nbreak"});
        let encoded = canonical_encode(&value);
        let decoded: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded["path"], "C:\\Windows\\system32");
    }
}
