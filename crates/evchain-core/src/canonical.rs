//! Canonical serialization used as hash input.
//!
//! The canonical form of a JSON value is:
//!   - object keys sorted by byte order at every nesting level
//!   - no whitespace between tokens
//!   - numbers in serde_json's shortest round-trip form
//!   - strings as UTF-8 with only the mandatory JSON escapes
//!
//! Two logically equal values always produce identical bytes, whatever
//! order their maps were built in.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use evchain_contracts::error::EvchainResult;

/// Canonical JSON text for `value`.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Canonical JSON text for any serializable value.
pub fn to_canonical_string<T: Serialize>(value: &T) -> EvchainResult<String> {
    Ok(canonical_string(&serde_json::to_value(value)?))
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 of the canonical form of `value`.
pub fn canonical_digest<T: Serialize>(value: &T) -> EvchainResult<String> {
    Ok(sha256_hex(to_canonical_string(value)?.as_bytes()))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    #[test]
    fn keys_are_sorted_at_every_level() {
        let value = json!({
            "b": 1,
            "a": { "z": true, "m": [ { "y": null, "x": "s" } ] }
        });
        assert_eq!(
            canonical_string(&value),
            r#"{"a":{"m":[{"x":"s","y":null}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn construction_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("event_type".to_string(), json!("plan.generated"));
        first.insert("data".to_string(), json!({ "k2": 2, "k1": 1.5 }));

        let mut second = Map::new();
        second.insert("data".to_string(), json!({ "k1": 1.5, "k2": 2 }));
        second.insert("event_type".to_string(), json!("plan.generated"));

        assert_eq!(
            canonical_string(&Value::Object(first)),
            canonical_string(&Value::Object(second))
        );
    }

    #[test]
    fn strings_escape_only_what_json_requires() {
        let value = json!("quote\" back\\ nl\n bell\u{07} café");
        assert_eq!(
            canonical_string(&value),
            "\"quote\\\" back\\\\ nl\\n bell\\u0007 café\""
        );
        // Round-trips through a JSON parser to the same string.
        let parsed: Value = serde_json::from_str(&canonical_string(&value)).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn numbers_are_stable() {
        let value = json!({ "i": -42, "u": 18446744073709551615u64, "f": 0.1 });
        assert_eq!(
            canonical_string(&value),
            r#"{"f":0.1,"i":-42,"u":18446744073709551615}"#
        );
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let a = canonical_digest(&json!({ "x": 1, "y": 2 })).unwrap();
        let b = canonical_digest(&json!({ "y": 2, "x": 1 })).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
