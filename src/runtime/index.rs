//! Index and slice protocol over values.
//!
//! Sequences index by integer (reads of out-of-range positions yield
//! `Undefined`, writes fail), maps and instances by string key. Class
//! instances apply the leading-underscore privacy rule: the external view
//! reads `Undefined` for private keys and silently ignores private writes,
//! while the `self` view sees both tables.
use crate::runtime::{error::RuntimeError, value::Value};

impl Value {
    pub fn index_get(&self, key: &Value) -> Result<Value, RuntimeError> {
        match self {
            Value::Array(items) => {
                let index = require_int_key(key)?;
                let items = items.read();
                Ok(element_at(&items, index))
            }
            Value::ImmutableArray(items) => {
                let index = require_int_key(key)?;
                Ok(element_at(items, index))
            }
            Value::String(value) => {
                let index = require_int_key(key)?;
                if index < 0 {
                    return Ok(Value::Undefined);
                }
                Ok(value
                    .chars()
                    .nth(index as usize)
                    .map(Value::Char)
                    .unwrap_or(Value::Undefined))
            }
            Value::Bytes(data) => {
                let index = require_int_key(key)?;
                if index < 0 {
                    return Ok(Value::Undefined);
                }
                Ok(data
                    .read()
                    .get(index as usize)
                    .map(|byte| Value::Int(*byte as i64))
                    .unwrap_or(Value::Undefined))
            }
            Value::Map(entries) => {
                let name = require_string_key(key)?;
                Ok(entries.read().get(name).cloned().unwrap_or(Value::Undefined))
            }
            Value::ImmutableMap(entries) => {
                let name = require_string_key(key)?;
                Ok(entries.get(name).cloned().unwrap_or(Value::Undefined))
            }
            Value::Class(class) => {
                let name = require_string_key(key)?;
                if name == "name" {
                    Ok(Value::String(class.name.as_str().into()))
                } else {
                    Ok(Value::Undefined)
                }
            }
            Value::Instance(instance) => {
                let name = require_string_key(key)?;
                if name.starts_with('_') {
                    // private reads are hidden from the outside
                    return Ok(Value::Undefined);
                }
                Ok(instance
                    .public
                    .read()
                    .get(name)
                    .cloned()
                    .unwrap_or(Value::Undefined))
            }
            Value::InstanceSelf(instance) => {
                let name = require_string_key(key)?;
                let table = if name.starts_with('_') {
                    instance.private.read()
                } else {
                    instance.public.read()
                };
                Ok(table.get(name).cloned().unwrap_or(Value::Undefined))
            }
            Value::Host(host) => host.index_get(key),
            other => Err(RuntimeError::NotIndexable(other.type_name().into_owned())),
        }
    }

    pub fn index_set(&self, key: &Value, value: Value) -> Result<(), RuntimeError> {
        match self {
            Value::Array(items) => {
                let index = require_int_key(key)?;
                let mut items = items.write();
                if index < 0 || index as usize >= items.len() {
                    return Err(RuntimeError::IndexOutOfBounds(index));
                }
                items[index as usize] = value;
                Ok(())
            }
            Value::Bytes(data) => {
                let index = require_int_key(key)?;
                let mut data = data.write();
                if index < 0 || index as usize >= data.len() {
                    return Err(RuntimeError::IndexOutOfBounds(index));
                }
                let byte = match &value {
                    Value::Int(v) if (0..=255).contains(v) => *v as u8,
                    other => {
                        return Err(RuntimeError::InvalidIndexValueType(
                            other.type_name().into_owned(),
                        ))
                    }
                };
                data[index as usize] = byte;
                Ok(())
            }
            Value::Map(entries) => {
                let name = require_string_key(key)?;
                entries.write().insert(name.to_string(), value);
                Ok(())
            }
            Value::Instance(instance) => {
                let name = require_string_key(key)?;
                if name.starts_with('_') {
                    // private writes from the outside are silently dropped
                    return Ok(());
                }
                instance.public.write().insert(name.to_string(), value);
                Ok(())
            }
            Value::InstanceSelf(instance) => {
                let name = require_string_key(key)?;
                let mut table = if name.starts_with('_') {
                    instance.private.write()
                } else {
                    instance.public.write()
                };
                table.insert(name.to_string(), value);
                Ok(())
            }
            Value::Host(host) => host.index_set(key, value),
            other => Err(RuntimeError::NotIndexAssignable(
                other.type_name().into_owned(),
            )),
        }
    }
}

fn require_int_key(key: &Value) -> Result<i64, RuntimeError> {
    match key {
        Value::Int(index) => Ok(*index),
        other => Err(RuntimeError::InvalidIndexType(
            other.type_name().into_owned(),
        )),
    }
}

fn require_string_key(key: &Value) -> Result<&str, RuntimeError> {
    match key {
        Value::String(name) => Ok(name),
        other => Err(RuntimeError::InvalidIndexType(
            other.type_name().into_owned(),
        )),
    }
}

fn element_at(items: &[Value], index: i64) -> Value {
    if index < 0 {
        return Value::Undefined;
    }
    items.get(index as usize).cloned().unwrap_or(Value::Undefined)
}

/// Walks a selector chain right-to-left (`dst[s_n-1]…[s_1][s_0] = src`):
/// every selector but the last resolves through `index_get`, the last one
/// assigns.
pub fn index_assign(dst: &Value, src: &Value, selectors: &[Value]) -> Result<(), RuntimeError> {
    let mut target = dst.clone();
    for selector in selectors.iter().skip(1).rev() {
        target = target.index_get(selector)?;
    }
    target.index_set(&selectors[0], src.clone())
}

/// Slice with clamping: negative bounds clamp to zero, over-length bounds
/// clamp to the length, and a reversed range after clamping is an error.
/// The result is always a fresh container; slicing an immutable array
/// yields a mutable one.
pub fn slice_value(left: &Value, low: &Value, high: &Value) -> Result<Value, RuntimeError> {
    let low = match low {
        Value::Undefined => 0,
        Value::Int(v) => *v,
        other => {
            return Err(RuntimeError::InvalidIndexType(
                other.type_name().into_owned(),
            ))
        }
    };
    let high = match high {
        Value::Undefined => i64::MAX,
        Value::Int(v) => *v,
        other => {
            return Err(RuntimeError::InvalidIndexType(
                other.type_name().into_owned(),
            ))
        }
    };

    match left {
        Value::Array(items) => {
            let items = items.read();
            let (lo, hi) = clamp(low, high, items.len())?;
            Ok(Value::array(items[lo..hi].to_vec()))
        }
        Value::ImmutableArray(items) => {
            let (lo, hi) = clamp(low, high, items.len())?;
            Ok(Value::array(items[lo..hi].to_vec()))
        }
        Value::String(value) => {
            let chars: Vec<char> = value.chars().collect();
            let (lo, hi) = clamp(low, high, chars.len())?;
            Ok(Value::String(chars[lo..hi].iter().collect::<String>().into()))
        }
        Value::Bytes(data) => {
            let data = data.read();
            let (lo, hi) = clamp(low, high, data.len())?;
            Ok(Value::bytes(data[lo..hi].to_vec()))
        }
        other => Err(RuntimeError::NotIndexable(other.type_name().into_owned())),
    }
}

fn clamp(low: i64, high: i64, len: usize) -> Result<(usize, usize), RuntimeError> {
    let len = len as i64;
    let lo = low.clamp(0, len);
    let hi = high.clamp(0, len);
    if lo > hi {
        return Err(RuntimeError::InvalidSliceRange { low: lo, high: hi });
    }
    Ok((lo as usize, hi as usize))
}
