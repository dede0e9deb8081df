//! Configuration Module
//!
//! Loads memoizer defaults and backend locations from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::{Host, DEFAULT_VERSION};
use crate::error::Result;
use crate::memo::MemoOptions;

/// Runtime configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Cache version used when a wrapper does not set one
    pub default_version: String,
    /// Default lifetime of stored results in milliseconds, 0 = never expire
    pub default_expire_ms: u64,
    /// Directory of the persistent store; `None` runs headless
    pub storage_dir: Option<PathBuf>,
    /// Expired entry sweep interval in seconds
    pub sweep_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMO_DEFAULT_VERSION` - Cache version (default: v1.0.0)
    /// - `MEMO_DEFAULT_EXPIRE_MS` - Result lifetime in ms (default: 0)
    /// - `MEMO_STORAGE_DIR` - Persistent store directory (default: unset)
    /// - `MEMO_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        Self {
            default_version: env::var("MEMO_DEFAULT_VERSION")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            default_expire_ms: env::var("MEMO_DEFAULT_EXPIRE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            storage_dir: env::var_os("MEMO_STORAGE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            sweep_interval: env::var("MEMO_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }

    /// Builds the host: persistent when `storage_dir` is set, headless otherwise.
    pub fn host(&self) -> Result<Host> {
        match &self.storage_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Host::persistent(dir)
            }
            None => Ok(Host::headless()),
        }
    }

    /// Default wrapper options. Storage stays off until a wrapper opts in.
    pub fn memo_options(&self) -> MemoOptions {
        MemoOptions::new()
            .version(self.default_version.clone())
            .expire_time_ms(self.default_expire_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_version: DEFAULT_VERSION.to_string(),
            default_expire_ms: 0,
            storage_dir: None,
            sweep_interval: 60,
        }
    }
}
