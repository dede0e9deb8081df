//! Path Module
//!
//! Nested-value accessors over JSON trees using dotted and bracket paths.

mod access;
mod keys;
mod select;


pub use access::{get_by_path, set_by_path, unset_by_path, MAX_ARRAY_PADDING};
pub use keys::{to_path, IntoPath, PathKey};
pub use select::{omit, pick};
