//! Structural equality for test values.
//!
//! Two values are equal when their JSON serializations would be equal once
//! object keys are put in a canonical order. That means integer `1` and
//! float `1.0` compare equal: both serialize as `1`. Values that differ but
//! serialize identically are therefore indistinguishable to the harness;
//! suites rely on this, so the rule is kept as is.

use serde_json::{Number, Value};

pub fn structural_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| structural_eq(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| structural_eq(x, y)))
        }
        _ => false,
    }
}

fn numbers_eq(x: &Number, y: &Number) -> bool {
    // Exact integer paths first so large integers don't lose precision in f64.
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Canonical (RFC 8785) text form of a value, used when showing values to
/// the user. Falls back to plain JSON if canonicalization fails.
pub fn canonical_string(value: &Value) -> String {
    serde_jcs::to_string(value).unwrap_or_else(|_| value.to_string())
}
