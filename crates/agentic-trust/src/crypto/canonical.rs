//! Canonical JSON for hashing and signatures.
//!
//! Object keys are sorted by their UTF-8 bytes, no whitespace is emitted,
//! strings use JSON escaping and numbers use their shortest round-trip form.
//! The same logical value always produces the same bytes, regardless of
//! the insertion order of the map it came from.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, TrustError};

/// Canonicalize a JSON value.
pub fn canonicalize(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// Serialize any value and canonicalize the result.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    canonicalize(&value)
}

fn write_value(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

            out.push('{');
            for (idx, (k, v)) in pairs.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(k, out)?;
                out.push(':');
                write_value(v, out)?;
            }
            out.push('}');
        }
        Value::Array(arr) => {
            out.push('[');
            for (idx, v) in arr.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(v, out)?;
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out)?,
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(TrustError::SerializationError(
                        "non-finite numbers are not valid JSON".into(),
                    ));
                }
                // -0.0 hashes like 0.0; a float zero stays a float
                if f == 0.0 && f.is_sign_negative() {
                    out.push_str("0.0");
                    return Ok(());
                }
            }
            out.push_str(&n.to_string());
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) -> Result<()> {
    out.push_str(&serde_json::to_string(s)?);
    Ok(())
}
