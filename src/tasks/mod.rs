//! Background Tasks Module
//!
//! # Tasks
//! - Sweep: removes expired cache entries at configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
