//! Tree-edit driver contract
//!
//! A driver describes the difference between the working copy and the
//! target tree as nested calls:
//!
//! ```text
//! set_target_revision? open_root
//!   ( delete_entry
//!   | add_directory/open_directory ... close_directory
//!   | change_dir_prop
//!   | add_file/open_file apply_textdelta? change_file_prop* close_file )*
//! close_directory(root) close_edit
//! ```
//!
//! A directory may only be closed after every directory opened under it
//! has been closed. Files may stay open past their parent's close; the
//! parent then finalizes when the last of them closes.

use crate::baton::{CopySource, DirId, FileId};
use crate::delta::WindowHandler;
use wc_core::{Checksum, Result, Revnum};

pub trait Editor {
    /// Revision the working copy is being moved to
    fn set_target_revision(&mut self, revision: Revnum) -> Result<()>;

    /// Open the anchor directory; called exactly once, first
    fn open_root(&mut self, base_revision: Option<Revnum>) -> Result<DirId>;

    /// Remove `name` from `parent`
    fn delete_entry(&mut self, name: &str, parent: DirId) -> Result<()>;

    /// Add a directory that must not exist on disk yet
    fn add_directory(
        &mut self,
        name: &str,
        parent: DirId,
        copy_from: Option<CopySource>,
    ) -> Result<DirId>;

    fn open_directory(&mut self, name: &str, parent: DirId) -> Result<DirId>;

    /// Queue a property change; `None` deletes the property
    fn change_dir_prop(&mut self, dir: DirId, name: &str, value: Option<&str>) -> Result<()>;

    fn close_directory(&mut self, dir: DirId) -> Result<()>;

    fn add_file(&mut self, name: &str, parent: DirId, copy_from: Option<CopySource>)
        -> Result<FileId>;

    fn open_file(&mut self, name: &str, parent: DirId) -> Result<FileId>;

    /// Start receiving the new text of `file`
    ///
    /// `base_checksum` is what the driver believes the pristine text hashes
    /// to. The returned handler takes windows until it gets `None`.
    fn apply_textdelta(
        &mut self,
        file: FileId,
        base_checksum: Option<Checksum>,
    ) -> Result<Box<dyn WindowHandler>>;

    fn change_file_prop(&mut self, file: FileId, name: &str, value: Option<&str>) -> Result<()>;

    /// Finalize `file`; `text_checksum` is the expected hash of the new text
    fn close_file(&mut self, file: FileId, text_checksum: Option<Checksum>) -> Result<()>;

    /// Called exactly once, last
    fn close_edit(&mut self) -> Result<()>;

    /// Give up on the edit, leaving written journals for recovery
    fn abort_edit(&mut self) -> Result<()>;
}
