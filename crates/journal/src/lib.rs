//! Working-copy journal and recovery
//!
//! This crate provides:
//! - Journal step vocabulary (JSON lines)
//! - Per-directory journal writer and replayer
//! - Crash recovery and recursive cleanup

pub mod journal;
pub mod recovery;
pub mod step;

// Re-exports
pub use journal::{execute_steps, read_log, replay, state, Journal, JournalState, ReplayReport};
pub use recovery::{cleanup, recover_dir, CleanupReport};
pub use step::JournalStep;
