//! Lenient value conversions used by the conversion builtins, the
//! concurrency opcodes, and embedders. `None` means the value has no
//! sensible rendition in the target type; callers decide between a
//! fallback and `Undefined`.
use crate::runtime::value::Value;

pub fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::Float(v) => Some(*v as i64),
        Value::Char(v) => Some(*v as i64),
        Value::Bool(v) => Some(i64::from(*v)),
        Value::String(v) => v.parse().ok(),
        _ => None,
    }
}

pub fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        Value::String(v) => v.parse().ok(),
        _ => None,
    }
}

/// Interpolation-friendly text: strings and chars render raw, everything
/// else through its display form. `Undefined` does not convert.
pub fn to_string_value(value: &Value) -> Option<String> {
    match value {
        Value::Undefined => None,
        Value::String(v) => Some(v.to_string()),
        Value::Char(v) => Some(v.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn to_bool(value: &Value) -> Option<bool> {
    Some(!value.is_falsy())
}

pub fn to_char(value: &Value) -> Option<char> {
    match value {
        Value::Char(v) => Some(*v),
        Value::Int(v) => u32::try_from(*v).ok().and_then(char::from_u32),
        Value::String(v) => v.chars().next(),
        _ => None,
    }
}

pub fn to_byte_vec(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(v) => Some(v.read().clone()),
        Value::String(v) => Some(v.as_bytes().to_vec()),
        _ => None,
    }
}

/// Nanoseconds since the Unix epoch.
pub fn to_time(value: &Value) -> Option<i64> {
    match value {
        Value::Time(v) => Some(*v),
        Value::Int(v) => Some(*v),
        _ => None,
    }
}
