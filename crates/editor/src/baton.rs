//! Baton arena with reference-counted directory lifetimes
//!
//! Open directories and files live in index-addressed slots. A directory's
//! count starts at 1 for the directory itself and grows by one for every
//! child opened under it; it finalizes when the count returns to zero.
//! Parent links are plain indices.

use crate::delta::StagedSlot;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use wc_core::{AdmArea, EntryAttr, PropChange, Result, Revnum, WcError};

/// Handle of an open directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirId(usize);

/// Handle of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(usize);

/// Origin of a copied node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySource {
    pub url: String,
    pub revision: Revnum,
}

#[derive(Debug)]
pub(crate) struct DirBaton {
    pub path: PathBuf,
    pub name: String,
    pub parent: Option<DirId>,
    pub area: AdmArea,
    pub url: String,
    pub ref_count: usize,
    pub added: bool,
    /// Re-added over an incomplete directory left by an earlier edit
    pub resumed: bool,
    pub copy_from: Option<CopySource>,
    pub prop_changes: Vec<PropChange>,
    pub entry_changes: Vec<EntryAttr>,
    /// Close was requested by the driver
    pub closed: bool,
    /// Child directories not yet closed by the driver
    pub open_subdirs: usize,
    /// First child whose finalization failed
    pub failed_child: Option<PathBuf>,
}

impl DirBaton {
    pub fn new(name: &str, path: PathBuf, area: AdmArea, url: String, parent: Option<DirId>) -> Self {
        Self {
            path,
            name: name.to_string(),
            parent,
            area,
            url,
            ref_count: 1,
            added: false,
            resumed: false,
            copy_from: None,
            prop_changes: Vec::new(),
            entry_changes: Vec::new(),
            closed: false,
            open_subdirs: 0,
            failed_child: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FileBaton {
    pub parent: DirId,
    pub name: String,
    pub path: PathBuf,
    pub added: bool,
    pub copy_from: Option<CopySource>,
    /// Set once a delta stream was requested
    pub text: Option<StagedSlot>,
    pub prop_changes: Vec<PropChange>,
    pub entry_changes: Vec<EntryAttr>,
}

impl FileBaton {
    pub fn new(name: &str, path: PathBuf, parent: DirId) -> Self {
        Self {
            parent,
            name: name.to_string(),
            path,
            added: false,
            copy_from: None,
            text: None,
            prop_changes: Vec::new(),
            entry_changes: Vec::new(),
        }
    }
}

/// Owner of every live baton of one edit session
#[derive(Debug, Default)]
pub(crate) struct BatonArena {
    dirs: Vec<Option<DirBaton>>,
    files: Vec<Option<FileBaton>>,
    live_dirs: usize,
    live_files: usize,
}

fn stale_dir(id: DirId) -> WcError {
    WcError::ProtocolViolation(format!("directory handle {} is not open", id.0))
}

fn stale_file(id: FileId) -> WcError {
    WcError::ProtocolViolation(format!("file handle {} is not open", id.0))
}

impl BatonArena {
    /// Allocate a directory baton, taking a reference on its parent
    pub fn make_dir(&mut self, baton: DirBaton) -> Result<DirId> {
        if let Some(parent) = baton.parent {
            let parent = self.dir_mut(parent)?;
            parent.ref_count += 1;
            parent.open_subdirs += 1;
        }
        self.dirs.push(Some(baton));
        self.live_dirs += 1;
        Ok(DirId(self.dirs.len() - 1))
    }

    /// Allocate a file baton, taking a reference on its parent
    pub fn make_file(&mut self, baton: FileBaton) -> Result<FileId> {
        self.dir_mut(baton.parent)?.ref_count += 1;
        self.files.push(Some(baton));
        self.live_files += 1;
        Ok(FileId(self.files.len() - 1))
    }

    pub fn dir(&self, id: DirId) -> Result<&DirBaton> {
        self.dirs
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| stale_dir(id))
    }

    pub fn dir_mut(&mut self, id: DirId) -> Result<&mut DirBaton> {
        self.dirs
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| stale_dir(id))
    }

    pub fn file(&self, id: FileId) -> Result<&FileBaton> {
        self.files
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| stale_file(id))
    }

    pub fn file_mut(&mut self, id: FileId) -> Result<&mut FileBaton> {
        self.files
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| stale_file(id))
    }

    /// Free a file baton
    pub fn take_file(&mut self, id: FileId) -> Result<FileBaton> {
        let baton = self
            .files
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| stale_file(id))?;
        self.live_files -= 1;
        Ok(baton)
    }

    /// Drop one reference; `true` when the directory is ready to finalize
    pub fn decrement(&mut self, id: DirId) -> Result<bool> {
        let baton = self.dir_mut(id)?;
        if baton.ref_count == 0 {
            return Err(WcError::ProtocolViolation(format!(
                "reference count of '{}' already zero",
                baton.path.display()
            )));
        }
        baton.ref_count -= 1;
        Ok(baton.ref_count == 0)
    }

    /// Free a directory baton whose count reached zero
    pub fn take_dir(&mut self, id: DirId) -> Result<DirBaton> {
        let slot = self.dirs.get_mut(id.0).ok_or_else(|| stale_dir(id))?;
        match slot {
            Some(baton) if baton.ref_count == 0 => {}
            Some(baton) => {
                return Err(WcError::ProtocolViolation(format!(
                    "'{}' still has {} references",
                    baton.path.display(),
                    baton.ref_count
                )))
            }
            None => return Err(stale_dir(id)),
        }
        let baton = slot.take().ok_or_else(|| stale_dir(id))?;
        self.live_dirs -= 1;
        Ok(baton)
    }

    /// Record that a child under `id` failed to finalize
    pub fn poison(&mut self, id: DirId, child: PathBuf) {
        if let Ok(baton) = self.dir_mut(id) {
            baton.failed_child.get_or_insert(child);
        }
    }

    /// Number of batons not yet freed
    pub fn live(&self) -> (usize, usize) {
        (self.live_dirs, self.live_files)
    }

    /// Drop every baton without finalizing
    pub fn clear(&mut self) {
        self.dirs.clear();
        self.files.clear();
        self.live_dirs = 0;
        self.live_files = 0;
    }
}
