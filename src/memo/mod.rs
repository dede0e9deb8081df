//! Memo Module
//!
//! Async call coalescing, storage-backed memoization and the wrapper registry.

mod flight;
mod hash;
mod once;
mod registry;
mod stats;
mod wrapper;

// Re-export public types
pub use hash::{normalize_source, source_hash};
pub use once::AsyncOnce;
pub use registry::Memoizer;
pub use stats::CallStats;
pub use wrapper::{MemoOptions, Memoized, WrapperKind};
