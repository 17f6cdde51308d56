use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::runtime::{host::HostIterator, value::Value};

/// Iteration cursor over a value, produced by `OpIteratorInit`.
///
/// Sequence iterators read their source live (mutations during iteration
/// are observable); map iterators snapshot the key set at creation and
/// look values up on demand, so a key removed mid-iteration yields
/// `Undefined`. All cursors start before the first element.
#[derive(Debug)]
pub enum ValueIterator {
    Array {
        items: Arc<RwLock<Vec<Value>>>,
        index: i64,
    },
    ImmutableArray {
        items: Arc<Vec<Value>>,
        index: i64,
    },
    Map {
        keys: Vec<String>,
        entries: Arc<RwLock<HashMap<String, Value>>>,
        index: i64,
    },
    ImmutableMap {
        keys: Vec<String>,
        entries: Arc<HashMap<String, Value>>,
        index: i64,
    },
    Str {
        chars: Vec<char>,
        index: i64,
    },
    Bytes {
        data: Arc<RwLock<Vec<u8>>>,
        index: i64,
    },
    Host(Box<dyn HostIterator>),
}

impl ValueIterator {
    pub fn for_value(value: &Value) -> Option<ValueIterator> {
        let iterator = match value {
            Value::Array(items) => ValueIterator::Array {
                items: Arc::clone(items),
                index: -1,
            },
            Value::ImmutableArray(items) => ValueIterator::ImmutableArray {
                items: Arc::clone(items),
                index: -1,
            },
            Value::Map(entries) => ValueIterator::Map {
                keys: entries.read().keys().cloned().collect(),
                entries: Arc::clone(entries),
                index: -1,
            },
            Value::ImmutableMap(entries) => ValueIterator::ImmutableMap {
                keys: entries.keys().cloned().collect(),
                entries: Arc::clone(entries),
                index: -1,
            },
            Value::String(value) => ValueIterator::Str {
                chars: value.chars().collect(),
                index: -1,
            },
            Value::Bytes(data) => ValueIterator::Bytes {
                data: Arc::clone(data),
                index: -1,
            },
            Value::Host(host) => ValueIterator::Host(host.iterate()?),
            _ => return None,
        };
        Some(iterator)
    }

    /// Moves to the next element; false once the source is exhausted.
    pub fn advance(&mut self) -> bool {
        match self {
            ValueIterator::Array { items, index } => step(index, items.read().len()),
            ValueIterator::ImmutableArray { items, index } => step(index, items.len()),
            ValueIterator::Map { keys, index, .. } => step(index, keys.len()),
            ValueIterator::ImmutableMap { keys, index, .. } => step(index, keys.len()),
            ValueIterator::Str { chars, index } => step(index, chars.len()),
            ValueIterator::Bytes { data, index } => step(index, data.read().len()),
            ValueIterator::Host(host) => host.advance(),
        }
    }

    /// Current key: the position for sequences, the map key for maps.
    pub fn key(&self) -> Value {
        match self {
            ValueIterator::Array { index, .. }
            | ValueIterator::ImmutableArray { index, .. }
            | ValueIterator::Str { index, .. }
            | ValueIterator::Bytes { index, .. } => Value::Int(*index),
            ValueIterator::Map { keys, index, .. }
            | ValueIterator::ImmutableMap { keys, index, .. } => keys
                .get(*index as usize)
                .map(|key| Value::String(key.as_str().into()))
                .unwrap_or(Value::Undefined),
            ValueIterator::Host(host) => host.key(),
        }
    }

    /// Current element; `Undefined` when the source shrank under the cursor.
    pub fn current(&self) -> Value {
        match self {
            ValueIterator::Array { items, index } => items
                .read()
                .get(*index as usize)
                .cloned()
                .unwrap_or(Value::Undefined),
            ValueIterator::ImmutableArray { items, index } => items
                .get(*index as usize)
                .cloned()
                .unwrap_or(Value::Undefined),
            ValueIterator::Map {
                keys,
                entries,
                index,
            } => keys
                .get(*index as usize)
                .and_then(|key| entries.read().get(key).cloned())
                .unwrap_or(Value::Undefined),
            ValueIterator::ImmutableMap {
                keys,
                entries,
                index,
            } => keys
                .get(*index as usize)
                .and_then(|key| entries.get(key).cloned())
                .unwrap_or(Value::Undefined),
            ValueIterator::Str { chars, index } => chars
                .get(*index as usize)
                .map(|ch| Value::Char(*ch))
                .unwrap_or(Value::Undefined),
            ValueIterator::Bytes { data, index } => data
                .read()
                .get(*index as usize)
                .map(|byte| Value::Int(*byte as i64))
                .unwrap_or(Value::Undefined),
            ValueIterator::Host(host) => host.current(),
        }
    }
}

fn step(index: &mut i64, len: usize) -> bool {
    if *index + 1 >= len as i64 {
        return false;
    }
    *index += 1;
    true
}
