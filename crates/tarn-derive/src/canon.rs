//! Canonical serialization for pre-hash records.
//!
//! The only requirement on this encoding is byte stability across runs and
//! platforms: object keys are emitted in ascending lexicographic order by
//! their UTF-8 bytes, array order is preserved, and string atoms use
//! standard JSON escaping. Absent values are elided by never inserting them
//! into the record; they do not appear as explicit nulls.
//!
//! The input is a [`serde_json::Value`], which is a finite tree by
//! construction, so cyclic input cannot reach this module and non-finite
//! numbers are unrepresentable.

use crate::Hash;
use serde_json::Value;

/// Serialize `value` canonically into `out`.
pub fn write_json(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_json(value, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// SHA-256 of the canonical serialization of `value`.
pub fn canon_hash(value: &Value) -> Result<Hash, serde_json::Error> {
    let mut buf = String::new();
    write_json(value, &mut buf)?;
    Ok(Hash::of(buf.as_bytes()))
}
