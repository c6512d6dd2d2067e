//! Error taxonomy for working-copy operations
//!
//! Conflicts are not errors: a finalization that records a conflict
//! succeeds. Everything in here aborts the operation it occurs in.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type used throughout the working-copy crates
pub type Result<T> = std::result::Result<T, WcError>;

/// Errors raised by the working-copy engine
#[derive(Debug, Error)]
pub enum WcError {
    /// An add target already exists on disk
    #[error("Failed to add '{path}': object of the same name already exists")]
    Obstructed { path: PathBuf },

    /// The entry store has no record for a name the driver referenced
    #[error("Entry not found: '{path}'")]
    EntryNotFound { path: PathBuf },

    /// The entry store already has a record for a name the driver tried to add
    #[error("Entry already exists: '{path}'")]
    EntryExists { path: PathBuf },

    /// Administrative lock already held
    #[error("Working copy '{path}' is locked; run cleanup")]
    Locked { path: PathBuf },

    /// Pristine text does not hash to the recorded checksum
    #[error("Corrupt text base for '{path}': expected {expected}, actual {actual}")]
    CorruptTextBase {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Reconstructed text does not hash to the checksum supplied by the driver
    #[error("Checksum mismatch for '{path}': expected {expected}, actual {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Caller requested the edit be aborted
    #[error("Operation cancelled")]
    Cancelled,

    /// Merge helper could not be started
    #[error("External program '{program}' could not be run: {reason}")]
    ExternalProgramMissing { program: String, reason: String },

    /// Merge helper exited outside the documented 0/1 convention
    #[error("External program '{program}' failed with exit status {status}")]
    ExternalProgramFailed { program: String, status: i32 },

    /// Journal replay could not converge
    #[error("Working copy '{path}' is corrupt: {reason}")]
    CorruptWorkingCopy { path: PathBuf, reason: String },

    /// Directory has no administrative area
    #[error("'{path}' is not a working copy")]
    NotWorkingCopy { path: PathBuf },

    /// Driver broke the sequencing rules of the edit protocol
    #[error("Edit protocol violation: {0}")]
    ProtocolViolation(String),

    /// A child finalization failed, so the parent cannot finish
    #[error("Cannot finish '{path}': a child finalization failed")]
    ChildFailed { path: PathBuf },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Flat error categories, for callers that only care about the class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Obstructed,
    EntryNotFound,
    EntryExists,
    Locked,
    CorruptTextBase,
    ChecksumMismatch,
    Cancelled,
    ExternalProgramMissing,
    ExternalProgramFailed,
    CorruptWorkingCopy,
    NotWorkingCopy,
    ProtocolViolation,
    ChildFailed,
    Io,
    Serialization,
}

impl WcError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WcError::Obstructed { .. } => ErrorKind::Obstructed,
            WcError::EntryNotFound { .. } => ErrorKind::EntryNotFound,
            WcError::EntryExists { .. } => ErrorKind::EntryExists,
            WcError::Locked { .. } => ErrorKind::Locked,
            WcError::CorruptTextBase { .. } => ErrorKind::CorruptTextBase,
            WcError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            WcError::Cancelled => ErrorKind::Cancelled,
            WcError::ExternalProgramMissing { .. } => ErrorKind::ExternalProgramMissing,
            WcError::ExternalProgramFailed { .. } => ErrorKind::ExternalProgramFailed,
            WcError::CorruptWorkingCopy { .. } => ErrorKind::CorruptWorkingCopy,
            WcError::NotWorkingCopy { .. } => ErrorKind::NotWorkingCopy,
            WcError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            WcError::ChildFailed { .. } => ErrorKind::ChildFailed,
            WcError::Io { .. } => ErrorKind::Io,
            WcError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WcError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        WcError::CorruptWorkingCopy {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for WcError {
    fn from(e: serde_json::Error) -> Self {
        WcError::Serialization(e.to_string())
    }
}

/// Attach a path to `std::io::Result`s
pub trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| WcError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = WcError::Obstructed {
            path: PathBuf::from("a/b"),
        };
        assert_eq!(err.kind(), ErrorKind::Obstructed);
        assert!(err.to_string().contains("a/b"));

        assert_eq!(WcError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_io_context() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result.at(Path::new("x.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("x.txt"));
    }
}
