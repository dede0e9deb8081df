//! Cache Module
//!
//! Versioned, TTL-aware cache cells over pluggable storage backends.

mod cell;
mod clock;
mod entry;
mod host;
mod storage;


// Re-export public types
pub use cell::{sweep_expired, CacheCell};
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::VersionedEntry;
pub use host::{Host, StorageKind, LOCAL_STORAGE_FILE, NO_HOST_STORAGE};
pub use storage::{FileStorage, MemoryStorage, Storage, Update, Updater};

// == Public Constants ==
/// Version used when none is given
pub const DEFAULT_VERSION: &str = "v1.0.0";
