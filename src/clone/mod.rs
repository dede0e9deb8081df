//! Clone Module
//!
//! Shared object graphs and their deep, cycle-preserving copies.

mod deep;
mod value;


pub use deep::{deep_clone, DeepCloner};
pub use value::{Composite, ObjectRef, PropKey, Record, Symbol, Value};
