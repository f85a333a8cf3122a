//! Background Tasks Module
//!
//! # Tasks
//! - TTL Cleanup: purges expired entries from the in-memory store
//! - Refresh Supervisor: owns detached refresh-ahead reloads

mod cleanup;
mod refresh;

pub use cleanup::spawn_cleanup_task;
pub use refresh::RefreshSupervisor;
