//! Journal step vocabulary
//!
//! Every path is relative to the directory that owns the journal. Each step
//! is either idempotent or checked before it is applied, so a journal can be
//! replayed from the top after an interruption at any point.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use wc_core::EntryAttr;

/// One primitive recovery action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalStep {
    /// Rename `src` over `dst`. Missing `src` with present `dst` counts as done.
    Move { src: PathBuf, dst: PathBuf },

    /// Copy `src` over `dst`. Missing `src` with present `dst` counts as done.
    Copy { src: PathBuf, dst: PathBuf },

    /// Remove a file or directory tree if present
    Remove { path: PathBuf },

    /// Set one attribute of the entry `name` (last write wins)
    ModifyEntry { name: String, attr: EntryAttr },

    /// Drop the entry record for `name`
    DeleteEntry { name: String },

    /// Record `reject_file` as the property reject file of `name` if it has
    /// content; remove it if it is empty
    DetectConflict { name: String, reject_file: PathBuf },
}

impl JournalStep {
    pub fn move_file(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        JournalStep::Move {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn copy_file(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        JournalStep::Copy {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn remove(path: impl Into<PathBuf>) -> Self {
        JournalStep::Remove { path: path.into() }
    }

    pub fn modify(name: &str, attr: EntryAttr) -> Self {
        JournalStep::ModifyEntry {
            name: name.to_string(),
            attr,
        }
    }

    /// Short tag for logging
    pub fn op_name(&self) -> &'static str {
        match self {
            JournalStep::Move { .. } => "move",
            JournalStep::Copy { .. } => "copy",
            JournalStep::Remove { .. } => "remove",
            JournalStep::ModifyEntry { .. } => "modify_entry",
            JournalStep::DeleteEntry { .. } => "delete_entry",
            JournalStep::DetectConflict { .. } => "detect_conflict",
        }
    }
}
