//! Three-way merge engine for working-copy updates
//!
//! This crate provides:
//! - Line-based diff3 text merge (built on `similar`)
//! - Conflict marker writing and parsing
//! - External diff3 helper command lines
//! - Three-way property merge and reject-file formatting

pub mod conflicts;
pub mod diff3;
pub mod external;
pub mod props;

// Re-exports
pub use conflicts::{has_conflict_markers, ConflictLabels};
pub use diff3::{merge_files, merge_text, MergeOptions, MergeOutcome, TextMerge};
pub use external::{diff3_command, Diff3Command, DIFF3_CONFLICT_EXIT};
pub use props::{format_rejects, merge_props, PropMerge, PropReject};

/// Resulting state of a node's text or properties after an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    /// Nothing was received for this aspect
    Inapplicable,
    Unchanged,
    /// Incoming changes replaced an unmodified local copy
    Changed,
    /// Incoming changes were combined with local modifications
    Merged,
    Conflicted,
}

impl From<MergeOutcome> for ChangeState {
    fn from(outcome: MergeOutcome) -> Self {
        match outcome {
            MergeOutcome::Unchanged => ChangeState::Unchanged,
            MergeOutcome::Merged => ChangeState::Merged,
            MergeOutcome::Conflicted | MergeOutcome::NoMerge => ChangeState::Conflicted,
        }
    }
}
