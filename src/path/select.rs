//! Path Selection Module
//!
//! Builds projections of JSON trees from lists of paths.

use serde_json::{Map, Value};
use tracing::debug;

use crate::path::access::{get_by_path, set_by_path, unset_by_path};
use crate::path::keys::{to_path, IntoPath};

/// Returns a new object holding only the values found at `paths`.
///
/// Paths that resolve to nothing are skipped; nesting is rebuilt with
/// [`set_by_path`].
///
/// # Example
/// ```
/// use mini_memo::path::pick;
/// use serde_json::json;
///
/// let obj = json!({ "a": 1, "b": { "c": 2 }, "d": 3 });
/// assert_eq!(pick(&obj, ["a", "b.c"]), json!({ "a": 1, "b": { "c": 2 } }));
/// ```
pub fn pick<I>(value: &Value, paths: I) -> Value
where
    I: IntoIterator,
    I::Item: IntoPath,
{
    let mut result = Value::Object(Map::new());

    for path in paths {
        let keys = to_path(path);
        let Some(found) = get_by_path(value, &keys) else {
            continue;
        };
        if let Err(err) = set_by_path(&mut result, &keys, found.clone()) {
            debug!("pick skipped a path that conflicts with an earlier one: {}", err);
        }
    }

    result
}

/// Returns a deep copy of `value` with every path in `paths` removed.
///
/// # Example
/// ```
/// use mini_memo::path::omit;
/// use serde_json::json;
///
/// let obj = json!({ "a": 1, "b": { "c": 2 }, "d": 3 });
/// assert_eq!(omit(&obj, ["a", "b.c"]), json!({ "b": {}, "d": 3 }));
/// ```
pub fn omit<I>(value: &Value, paths: I) -> Value
where
    I: IntoIterator,
    I::Item: IntoPath,
{
    let mut result = value.clone();
    for path in paths {
        unset_by_path(&mut result, path);
    }
    result
}
