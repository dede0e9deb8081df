//! Mini Memo - Async call coalescing and versioned result caching
//!
//! Wraps async functions so identical concurrent calls share one invocation,
//! with optional TTL-aware caching in pluggable storage backends. Also ships
//! the path and deep-clone utilities the cache layer builds on.

pub mod cache;
pub mod clone;
pub mod config;
pub mod error;
pub mod memo;
pub mod path;
pub mod tasks;

pub use cache::{CacheCell, Host, StorageKind};
pub use config::Config;
pub use error::{CacheError, MemoError};
pub use memo::{AsyncOnce, MemoOptions, Memoized, Memoizer};
pub use tasks::spawn_sweep_task;
