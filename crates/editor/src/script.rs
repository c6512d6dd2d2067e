//! JSON edit scripts
//!
//! A script is a serialized sequence of driver calls. Directories and files
//! are named by small integer handles chosen by the script author; the
//! driver maps them to the editor's own handles.
//!
//! ```json
//! [
//!   {"op": "set_target_revision", "revision": 2},
//!   {"op": "open_root", "id": 0},
//!   {"op": "add_file", "parent": 0, "name": "a.txt", "id": 1},
//!   {"op": "apply_text", "file": 1, "text": "hello\n"},
//!   {"op": "close_file", "file": 1},
//!   {"op": "close_directory", "dir": 0},
//!   {"op": "close_edit"}
//! ]
//! ```

use crate::baton::{CopySource, DirId, FileId};
use crate::delta::{send_windows, text_windows, DeltaWindow, DEFAULT_WINDOW_SIZE};
use crate::driver::Editor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;
use wc_core::{Checksum, Result, Revnum, WcError};

/// One driver call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    SetTargetRevision {
        revision: Revnum,
    },
    OpenRoot {
        id: u32,
        #[serde(default)]
        base_revision: Option<Revnum>,
    },
    DeleteEntry {
        parent: u32,
        name: String,
    },
    AddDirectory {
        parent: u32,
        name: String,
        id: u32,
        #[serde(default)]
        copy_from: Option<CopySource>,
    },
    OpenDirectory {
        parent: u32,
        name: String,
        id: u32,
    },
    ChangeDirProp {
        dir: u32,
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    CloseDirectory {
        dir: u32,
    },
    AddFile {
        parent: u32,
        name: String,
        id: u32,
        #[serde(default)]
        copy_from: Option<CopySource>,
    },
    OpenFile {
        parent: u32,
        name: String,
        id: u32,
    },
    /// Full new text, sent as literal windows
    ApplyText {
        file: u32,
        #[serde(default)]
        base_checksum: Option<Checksum>,
        text: String,
    },
    ApplyTextDelta {
        file: u32,
        #[serde(default)]
        base_checksum: Option<Checksum>,
        windows: Vec<DeltaWindow>,
    },
    ChangeFileProp {
        file: u32,
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    CloseFile {
        file: u32,
        #[serde(default)]
        checksum: Option<Checksum>,
    },
    CloseEdit,
    AbortEdit,
}

pub fn parse_script(json: &str) -> Result<Vec<EditOp>> {
    Ok(serde_json::from_str(json)?)
}

#[derive(Default)]
struct Handles {
    dirs: HashMap<u32, DirId>,
    files: HashMap<u32, FileId>,
}

impl Handles {
    fn dir(&self, id: u32) -> Result<DirId> {
        self.dirs
            .get(&id)
            .copied()
            .ok_or_else(|| WcError::ProtocolViolation(format!("unknown directory handle {}", id)))
    }

    fn file(&self, id: u32) -> Result<FileId> {
        self.files
            .get(&id)
            .copied()
            .ok_or_else(|| WcError::ProtocolViolation(format!("unknown file handle {}", id)))
    }
}

/// Replay `ops` against `editor`, stopping at the first error
pub fn drive<E: Editor + ?Sized>(editor: &mut E, ops: &[EditOp]) -> Result<()> {
    let mut handles = Handles::default();
    for op in ops {
        trace!(?op, "drive");
        match op {
            EditOp::SetTargetRevision { revision } => editor.set_target_revision(*revision)?,
            EditOp::OpenRoot { id, base_revision } => {
                let dir = editor.open_root(*base_revision)?;
                handles.dirs.insert(*id, dir);
            }
            EditOp::DeleteEntry { parent, name } => {
                editor.delete_entry(name, handles.dir(*parent)?)?
            }
            EditOp::AddDirectory {
                parent,
                name,
                id,
                copy_from,
            } => {
                let dir = editor.add_directory(name, handles.dir(*parent)?, copy_from.clone())?;
                handles.dirs.insert(*id, dir);
            }
            EditOp::OpenDirectory { parent, name, id } => {
                let dir = editor.open_directory(name, handles.dir(*parent)?)?;
                handles.dirs.insert(*id, dir);
            }
            EditOp::ChangeDirProp { dir, name, value } => {
                editor.change_dir_prop(handles.dir(*dir)?, name, value.as_deref())?
            }
            EditOp::CloseDirectory { dir } => editor.close_directory(handles.dir(*dir)?)?,
            EditOp::AddFile {
                parent,
                name,
                id,
                copy_from,
            } => {
                let file = editor.add_file(name, handles.dir(*parent)?, copy_from.clone())?;
                handles.files.insert(*id, file);
            }
            EditOp::OpenFile { parent, name, id } => {
                let file = editor.open_file(name, handles.dir(*parent)?)?;
                handles.files.insert(*id, file);
            }
            EditOp::ApplyText {
                file,
                base_checksum,
                text,
            } => {
                let mut handler = editor.apply_textdelta(handles.file(*file)?, *base_checksum)?;
                let windows = text_windows(text.as_bytes(), DEFAULT_WINDOW_SIZE);
                send_windows(handler.as_mut(), &windows)?;
            }
            EditOp::ApplyTextDelta {
                file,
                base_checksum,
                windows,
            } => {
                let mut handler = editor.apply_textdelta(handles.file(*file)?, *base_checksum)?;
                send_windows(handler.as_mut(), windows)?;
            }
            EditOp::ChangeFileProp { file, name, value } => {
                editor.change_file_prop(handles.file(*file)?, name, value.as_deref())?
            }
            EditOp::CloseFile { file, checksum } => {
                editor.close_file(handles.file(*file)?, *checksum)?;
                handles.files.remove(file);
            }
            EditOp::CloseEdit => editor.close_edit()?,
            EditOp::AbortEdit => editor.abort_edit()?,
        }
    }
    Ok(())
}
