//! Value coercions shared by the resolver, the filters and the executor
//!
//! Workflow values are plain JSON. An absent value ("undefined") is modelled as
//! `None` wherever the distinction from `null` matters.

use serde_json::Value as JsonValue;

/// Check if a value is truthy
///
/// `null`, `false`, `0`, `NaN` and the empty string are falsy; every array and
/// object (even an empty one) is truthy.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// Truthiness of a possibly-undefined value
pub fn is_truthy_opt(value: Option<&JsonValue>) -> bool {
    value.map(is_truthy).unwrap_or(false)
}

/// Coerce a value to the text spliced into a partially interpolated string
///
/// Strings are inserted raw, whole numbers without a trailing `.0`, and
/// compound values as compact JSON.
pub fn to_display_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => format_float(f),
            _ => n.to_string(),
        },
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Build a JSON number, keeping whole values integral
///
/// Non-finite results have no JSON representation and become `null`.
pub fn number_value(f: f64) -> JsonValue {
    if !f.is_finite() {
        return JsonValue::Null;
    }
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return JsonValue::from(f as i64);
    }
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Name of a value's type, used in error messages
pub fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
