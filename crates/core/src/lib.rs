//! Working-copy primitives
//!
//! This crate provides:
//! - Error taxonomy shared by every working-copy crate
//! - BLAKE3 checksums for pristine texts
//! - Administrative area layout and atomic writes
//! - Entry store (per-directory metadata)
//! - Property files
//! - Per-directory administrative lock
//! - Configuration

pub mod adm;
pub mod config;
pub mod entries;
pub mod error;
pub mod hash;
pub mod lock;
pub mod props;

// Re-exports
pub use adm::AdmArea;
pub use config::WcConfig;
pub use entries::{
    EntryAttr, EntryStore, NodeKind, Revnum, Schedule, TimeValue, WorkingEntry, THIS_DIR,
};
pub use error::{ErrorKind, IoResultExt, Result, WcError};
pub use hash::{hash_bytes, hash_file, Checksum, IncrementalHasher};
pub use lock::AdminLock;
pub use props::{PropChange, PropList};
