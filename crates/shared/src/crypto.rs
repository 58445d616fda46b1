//! Hashing and random token helpers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Length of one-time SMS verification codes.
pub const SMS_CODE_LEN: usize = 6;

/// Computes SHA-256 of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash stored for an SMS code. Binding the phone number into the digest
/// keeps identical codes for different phones from sharing a hash.
pub fn sms_code_hash(phone: &str, code: &str) -> String {
    sha256_hex(&format!("{}:{}", phone, code))
}

/// Generates a numeric one-time code, zero padded.
pub fn generate_sms_code() -> String {
    let mut rng = rand::thread_rng();
    (0..SMS_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Generates a 256-bit random token, URL-safe base64 without padding.
pub fn generate_secure_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Serialises a JSON value with object keys sorted at every depth.
///
/// Two payloads that differ only in key order produce the same string, which
/// makes the output usable as a content-hash input.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 of the canonical JSON form of `value`.
pub fn content_hash(value: &Value) -> String {
    sha256_hex(&canonical_json(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_sms_code_hash_binds_phone() {
        assert_ne!(
            sms_code_hash("13800000000", "123456"),
            sms_code_hash("13900000000", "123456")
        );
        assert_eq!(
            sms_code_hash("13800000000", "123456"),
            sms_code_hash("13800000000", "123456")
        );
    }

    #[test]
    fn test_generate_sms_code_format() {
        for _ in 0..50 {
            let code = generate_sms_code();
            assert_eq!(code.len(), SMS_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_secure_token_unique() {
        let a = generate_secure_token();
        let b = generate_secure_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": [1, 2], "c": "x"}});
        let b = json!({"a": {"c": "x", "d": [1, 2]}, "b": 1});
        assert_eq!(canonical_json(&a), r#"{"a":{"c":"x","d":[1,2]},"b":1}"#);
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_hash_detects_changes() {
        let a = json!([{"id": 1, "durationSeconds": 60}]);
        let b = json!([{"id": 1, "durationSeconds": 61}]);
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let v = json!({"k\"ey": "va\nlue"});
        assert_eq!(canonical_json(&v), r#"{"k\"ey":"va\nlue"}"#);
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(content_hash(&json!([1, 2])), content_hash(&json!([2, 1])));
    }
}
