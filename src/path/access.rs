//! Path Access Module
//!
//! Reads, writes and removes values at nested paths inside JSON trees.

use serde_json::{Map, Value};

use crate::error::PathError;
use crate::path::keys::{to_path, IntoPath, PathKey};

/// Most `null` slots a single write may append to an array.
pub const MAX_ARRAY_PADDING: usize = 1 << 16;

// == Get ==
/// Returns the value at `path`, or `None` if any step is missing.
///
/// Traversal stops at the first `null` or scalar intermediate. Never fails.
pub fn get_by_path(value: &Value, path: impl IntoPath) -> Option<&Value> {
    let mut current = value;
    for key in to_path(path) {
        current = child(current, &key)?;
    }
    Some(current)
}

// == Set ==
/// Writes `new_value` at `path`, creating intermediate containers.
///
/// A missing or `null` intermediate becomes an array when the following key
/// looks numeric and an object otherwise. Writing past the end of an array
/// pads it with `null`. An empty path leaves `value` untouched.
///
/// # Errors
/// Fails when traversal meets a scalar, a non-numeric key on an array, or an
/// index more than [`MAX_ARRAY_PADDING`] past the end of an array.
pub fn set_by_path(value: &mut Value, path: impl IntoPath, new_value: Value) -> Result<(), PathError> {
    let keys = to_path(path);
    let Some((last, parents)) = keys.split_last() else {
        return Ok(());
    };

    let mut current = value;
    for (position, key) in parents.iter().enumerate() {
        let slot = slot_mut(current, key)?;
        if slot.is_null() {
            *slot = if keys[position + 1].looks_numeric() {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            };
        }
        current = slot;
    }

    *slot_mut(current, last)? = new_value;
    Ok(())
}

// == Unset ==
/// Removes the value at `path` if its parent exists.
///
/// Object keys are deleted; array slots are reset to `null` so the remaining
/// indices stay put. Missing segments make this a no-op.
pub fn unset_by_path(value: &mut Value, path: impl IntoPath) {
    let keys = to_path(path);
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = value;
    for key in parents {
        match child_mut(current, key) {
            Some(next) if !next.is_null() => current = next,
            _ => return,
        }
    }

    match current {
        Value::Object(map) => {
            map.remove(&*last.as_name());
        }
        Value::Array(items) => {
            if let Some(slot) = last.as_index().and_then(|index| items.get_mut(index)) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}

// == Helpers ==
fn child<'a>(container: &'a Value, key: &PathKey) -> Option<&'a Value> {
    match container {
        Value::Object(map) => map.get(&*key.as_name()),
        Value::Array(items) => key.as_index().and_then(|index| items.get(index)),
        _ => None,
    }
}

fn child_mut<'a>(container: &'a mut Value, key: &PathKey) -> Option<&'a mut Value> {
    match container {
        Value::Object(map) => map.get_mut(&*key.as_name()),
        Value::Array(items) => key.as_index().and_then(move |index| items.get_mut(index)),
        _ => None,
    }
}

/// Returns a mutable slot for `key`, inserting `null` if it does not exist yet.
fn slot_mut<'a>(container: &'a mut Value, key: &PathKey) -> Result<&'a mut Value, PathError> {
    match container {
        Value::Object(map) => Ok(map.entry(key.as_name().into_owned()).or_insert(Value::Null)),
        Value::Array(items) => {
            let index = key
                .as_index()
                .ok_or_else(|| PathError::InvalidIndex(key.to_string()))?;
            if index >= items.len() {
                let new_len = index
                    .checked_add(1)
                    .filter(|len| len - items.len() <= MAX_ARRAY_PADDING)
                    .ok_or_else(|| PathError::InvalidIndex(key.to_string()))?;
                items.resize(new_len, Value::Null);
            }
            Ok(&mut items[index])
        }
        _ => Err(PathError::NotAContainer(key.to_string())),
    }
}
