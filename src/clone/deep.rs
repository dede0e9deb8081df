//! Deep Clone Module
//!
//! Structural copies of object graphs, reproducing aliasing and cycles.

use std::collections::HashMap;

use crate::clone::value::{Composite, ObjectRef, Record, Value};

// == Deep Cloner ==
/// Clones object graphs while tracking which originals were already copied.
///
/// The identity map lives only for one top-level [`DeepCloner::clone_value`]
/// call and is cleared on entry and exit, so independent calls never share copies.
#[derive(Debug, Default)]
pub struct DeepCloner {
    /// Original identity -> (original handle, copy). The original is held so its
    /// address cannot be reused while the pass runs.
    seen: HashMap<usize, (ObjectRef, ObjectRef)>,
}

impl DeepCloner {
    pub fn new() -> Self {
        Self::default()
    }

    // == Clone Value ==
    /// Returns a copy of `value` that shares no object with it.
    pub fn clone_value(&mut self, value: &Value) -> Value {
        self.seen.clear();
        let copy = self.visit(value);
        self.seen.clear();
        copy
    }

    fn visit(&mut self, value: &Value) -> Value {
        match value {
            Value::Object(original) => Value::Object(self.visit_object(original)),
            primitive => primitive.clone(),
        }
    }

    fn visit_object(&mut self, original: &ObjectRef) -> ObjectRef {
        if let Some((_, copy)) = self.seen.get(&original.addr()) {
            return copy.clone();
        }

        // Shallow snapshot so no lock is held while recursing.
        let snapshot = original.read().clone();

        match snapshot {
            Composite::Date(at) => self.register(original, Composite::Date(at)),
            Composite::Regex { source, flags } => {
                self.register(original, Composite::Regex { source, flags })
            }
            Composite::Map(entries) => {
                let copy = self.register(original, Composite::Map(Vec::new()));
                let cloned = entries
                    .iter()
                    .map(|(k, v)| (self.visit(k), self.visit(v)))
                    .collect();
                *copy.write() = Composite::Map(cloned);
                copy
            }
            Composite::Set(items) => {
                let copy = self.register(original, Composite::Set(Vec::new()));
                let cloned = items.iter().map(|item| self.visit(item)).collect();
                *copy.write() = Composite::Set(cloned);
                copy
            }
            Composite::Array(items) => {
                let copy = self.register(original, Composite::Array(Vec::new()));
                let cloned = items.iter().map(|item| self.visit(item)).collect();
                *copy.write() = Composite::Array(cloned);
                copy
            }
            Composite::Record(record) => {
                let copy = self.register(
                    original,
                    Composite::Record(Record {
                        shape: record.shape.clone(),
                        props: Vec::new(),
                    }),
                );
                let props = record
                    .props
                    .iter()
                    .map(|(key, v)| (key.clone(), self.visit(v)))
                    .collect();
                *copy.write() = Composite::Record(Record {
                    shape: record.shape,
                    props,
                });
                copy
            }
        }
    }

    /// Allocates the copy and records it before any children are visited.
    fn register(&mut self, original: &ObjectRef, composite: Composite) -> ObjectRef {
        let copy = ObjectRef::new(composite);
        self.seen
            .insert(original.addr(), (original.clone(), copy.clone()));
        copy
    }
}

/// Returns a structurally independent copy of `value`.
///
/// # Example
/// ```
/// use mini_memo::clone::{deep_clone, Value};
/// use serde_json::json;
///
/// let original = Value::from(json!({ "a": [1, 2] }));
/// let copy = deep_clone(&original);
/// assert!(copy.structural_eq(&original));
/// assert!(!copy.ptr_eq(&original));
/// ```
pub fn deep_clone(value: &Value) -> Value {
    DeepCloner::new().clone_value(value)
}
