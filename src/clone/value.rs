//! Object Graph Value Module
//!
//! Dynamic values whose composite parts are shared by reference, so graphs
//! may contain aliasing and cycles.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Map;

use crate::error::CloneError;

// == Symbol ==
/// A unique property key. Two symbols are equal only if they are the same symbol.
#[derive(Clone)]
pub struct Symbol(Arc<Option<String>>);

impl Symbol {
    /// Creates a new symbol with a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self(Arc::new(Some(description.into())))
    }

    /// Creates a new symbol without a description.
    pub fn anonymous() -> Self {
        Self(Arc::new(None))
    }

    pub fn description(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

// == Property Key ==
/// Key of a record property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(String),
    Symbol(Symbol),
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(name.to_string())
    }
}

impl From<Symbol> for PropKey {
    fn from(symbol: Symbol) -> Self {
        PropKey::Symbol(symbol)
    }
}

// == Record ==
/// Keyed property bag with an optional prototype name.
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// Prototype/class name; `None` for plain objects
    pub shape: Option<Arc<str>>,
    /// Properties in insertion order
    pub props: Vec<(PropKey, Value)>,
}

impl Record {
    pub fn get(&self, key: &PropKey) -> Option<&Value> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Inserts or replaces a property, keeping its original position on replace.
    pub fn set(&mut self, key: PropKey, value: Value) {
        match self.props.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.props.push((key, value)),
        }
    }
}

// == Composite ==
/// Contents of a shared object.
#[derive(Debug, Clone)]
pub enum Composite {
    Date(DateTime<Utc>),
    Regex { source: String, flags: String },
    /// Ordered key-value container
    Map(Vec<(Value, Value)>),
    /// Ordered unique-value container
    Set(Vec<Value>),
    Array(Vec<Value>),
    Record(Record),
}

// == Object Reference ==
/// Shared handle to a composite. Cloning the handle aliases the object.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Composite>>);

impl ObjectRef {
    pub fn new(composite: Composite) -> Self {
        Self(Arc::new(RwLock::new(composite)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Composite> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Composite> {
        self.0.write()
    }

    /// Returns true if both handles point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of the object, stable while any handle is alive.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for ObjectRef {
    // Contents are not printed: the graph may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}

// == Value ==
/// A dynamic value. Primitives are held inline, composites by shared reference.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Symbol(Symbol),
    Object(ObjectRef),
}

impl Value {
    // == Constructors ==
    pub fn array(items: Vec<Value>) -> Self {
        Value::Object(ObjectRef::new(Composite::Array(items)))
    }

    pub fn record(props: Vec<(PropKey, Value)>) -> Self {
        Value::Object(ObjectRef::new(Composite::Record(Record { shape: None, props })))
    }

    /// Creates a record whose prototype is named `shape`.
    pub fn shaped(shape: &str, props: Vec<(PropKey, Value)>) -> Self {
        Value::Object(ObjectRef::new(Composite::Record(Record {
            shape: Some(Arc::from(shape)),
            props,
        })))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Object(ObjectRef::new(Composite::Map(entries)))
    }

    pub fn set(items: Vec<Value>) -> Self {
        Value::Object(ObjectRef::new(Composite::Set(items)))
    }

    pub fn date(at: DateTime<Utc>) -> Self {
        Value::Object(ObjectRef::new(Composite::Date(at)))
    }

    pub fn regex(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Value::Object(ObjectRef::new(Composite::Regex {
            source: source.into(),
            flags: flags.into(),
        }))
    }

    // == Accessors ==
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns true if both values are the same object.
    ///
    /// Primitives are never reference-equal.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    // == Structural Equality ==
    /// Compares two graphs by shape and content, ignoring identity.
    ///
    /// Cycles are handled coinductively: a pair of objects already under
    /// comparison is assumed equal.
    pub fn structural_eq(&self, other: &Value) -> bool {
        let mut assumed = HashSet::new();
        structural_eq_inner(self, other, &mut assumed)
    }

    // == JSON Conversion ==
    /// Converts the graph into JSON.
    ///
    /// Dates become RFC 3339 strings, regexes `/source/flags` strings, maps an
    /// array of `[key, value]` pairs and sets an array. Symbol-keyed and
    /// undefined record properties are dropped; undefined array slots and
    /// symbols become `null`.
    ///
    /// # Errors
    /// Returns [`CloneError::Cyclic`] if an object contains itself.
    pub fn to_json(&self) -> Result<serde_json::Value, CloneError> {
        let mut ancestors = HashSet::new();
        to_json_inner(self, &mut ancestors)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::record(
                map.into_iter()
                    .map(|(k, v)| (PropKey::Name(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

fn structural_eq_inner(a: &Value, b: &Value, assumed: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) || !assumed.insert((x.addr(), y.addr())) {
                return true;
            }
            let (left, right) = (x.read().clone(), y.read().clone());
            match (&left, &right) {
                (Composite::Date(p), Composite::Date(q)) => p == q,
                (
                    Composite::Regex { source: s1, flags: f1 },
                    Composite::Regex { source: s2, flags: f2 },
                ) => s1 == s2 && f1 == f2,
                (Composite::Map(p), Composite::Map(q)) => {
                    p.len() == q.len()
                        && p.iter().zip(q).all(|((k1, v1), (k2, v2))| {
                            structural_eq_inner(k1, k2, assumed) && structural_eq_inner(v1, v2, assumed)
                        })
                }
                (Composite::Set(p), Composite::Set(q)) | (Composite::Array(p), Composite::Array(q)) => {
                    p.len() == q.len() && p.iter().zip(q).all(|(v1, v2)| structural_eq_inner(v1, v2, assumed))
                }
                (Composite::Record(p), Composite::Record(q)) => {
                    p.shape == q.shape
                        && p.props.len() == q.props.len()
                        && p.props.iter().zip(&q.props).all(|((k1, v1), (k2, v2))| {
                            k1 == k2 && structural_eq_inner(v1, v2, assumed)
                        })
                }
                _ => false,
            }
        }
        _ => false,
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn to_json_inner(
    value: &Value,
    ancestors: &mut HashSet<usize>,
) -> Result<serde_json::Value, CloneError> {
    let obj = match value {
        Value::Undefined | Value::Null | Value::Symbol(_) => return Ok(serde_json::Value::Null),
        Value::Bool(b) => return Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => return Ok(number_to_json(*n)),
        Value::String(s) => return Ok(serde_json::Value::String(s.clone())),
        Value::Object(obj) => obj,
    };

    if !ancestors.insert(obj.addr()) {
        return Err(CloneError::Cyclic);
    }
    let snapshot = obj.read().clone();

    let json = match snapshot {
        Composite::Date(at) => {
            serde_json::Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Composite::Regex { source, flags } => {
            serde_json::Value::String(format!("/{}/{}", source, flags))
        }
        Composite::Map(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for (k, v) in &entries {
                pairs.push(serde_json::Value::Array(vec![
                    to_json_inner(k, ancestors)?,
                    to_json_inner(v, ancestors)?,
                ]));
            }
            serde_json::Value::Array(pairs)
        }
        Composite::Set(items) | Composite::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(to_json_inner(item, ancestors)?);
            }
            serde_json::Value::Array(out)
        }
        Composite::Record(record) => {
            let mut map = Map::new();
            for (key, v) in &record.props {
                let PropKey::Name(name) = key else {
                    continue;
                };
                if !matches!(v, Value::Undefined) {
                    map.insert(name.clone(), to_json_inner(v, ancestors)?);
                }
            }
            serde_json::Value::Object(map)
        }
    };

    ancestors.remove(&obj.addr());
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_symbol_identity() {
        let a = Symbol::new("tag");
        let b = Symbol::new("tag");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.description(), Some("tag"));
        assert_eq!(Symbol::anonymous().description(), None);
    }

    #[test]
    fn test_record_set_replaces_in_place() {
        let mut record = Record::default();
        record.set("a".into(), Value::Number(1.0));
        record.set("b".into(), Value::Number(2.0));
        record.set("a".into(), Value::Number(3.0));
        assert_eq!(record.props.len(), 2);
        assert!(matches!(record.get(&"a".into()), Some(Value::Number(n)) if *n == 3.0));
        assert!(matches!(record.props[0].0, PropKey::Name(ref n) if n == "a"));
    }

    #[test]
    fn test_json_roundtrip() {
        let source = json!({ "a": 1, "b": [true, null, "x"], "c": { "d": 1.5 } });
        let value = Value::from(source.clone());
        assert_eq!(value.to_json().unwrap(), source);
    }

    #[test]
    fn test_to_json_composites() {
        let at = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let value = Value::array(vec![
            Value::date(at),
            Value::regex("a+b", "gi"),
            Value::map(vec![(Value::String("k".into()), Value::Number(1.0))]),
            Value::set(vec![Value::Number(2.0)]),
        ]);
        assert_eq!(
            value.to_json().unwrap(),
            json!(["2024-01-02T03:04:05.000Z", "/a+b/gi", [["k", 1]], [2]])
        );
    }

    #[test]
    fn test_to_json_drops_symbol_and_undefined_props() {
        let value = Value::record(vec![
            (Symbol::new("s").into(), Value::Number(1.0)),
            ("u".into(), Value::Undefined),
            ("n".into(), Value::Number(2.0)),
        ]);
        assert_eq!(value.to_json().unwrap(), json!({ "n": 2 }));
    }

    #[test]
    fn test_to_json_rejects_cycle() {
        let value = Value::record(vec![]);
        let obj = value.as_object().unwrap().clone();
        if let Composite::Record(record) = &mut *obj.write() {
            record.set("me".into(), value.clone());
        }
        assert_eq!(value.to_json(), Err(CloneError::Cyclic));
    }

    #[test]
    fn test_to_json_allows_shared_subtrees() {
        let shared = Value::array(vec![Value::Number(1.0)]);
        let value = Value::array(vec![shared.clone(), shared]);
        assert_eq!(value.to_json().unwrap(), json!([[1], [1]]));
    }

    #[test]
    fn test_structural_eq() {
        let a = Value::from(json!({ "x": [1, 2] }));
        let b = Value::from(json!({ "x": [1, 2] }));
        let c = Value::from(json!({ "x": [1, 3] }));
        assert!(a.structural_eq(&b));
        assert!(!a.structural_eq(&c));
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn test_structural_eq_respects_shape() {
        let a = Value::shaped("Point", vec![("x".into(), Value::Number(1.0))]);
        let b = Value::record(vec![("x".into(), Value::Number(1.0))]);
        assert!(!a.structural_eq(&b));
    }
}
