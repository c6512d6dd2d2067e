//! Taking nodes out of revision control
//!
//! Used by `delete_entry`. Unmodified working files go away with their
//! administrative data; locally modified files stay behind unversioned.
//! Subdirectories are handled bottom-up, each under its own lock and
//! journal, and removed once empty.

use crate::modified::text_modified;
use journal::{recover_dir, Journal};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use wc_core::{
    AdmArea, AdminLock, EntryStore, IoResultExt, NodeKind, Result, WcConfig, WcError, WorkingEntry,
};

/// Remove `name` from revision control in `parent`
///
/// Returns `true` when local modifications were left behind on disk.
pub fn remove_from_revision_control(parent: &AdmArea, name: &str, config: &WcConfig) -> Result<bool> {
    let entries = EntryStore::load(parent)?;
    let entry = entries
        .get(name)
        .filter(|_| !name.is_empty())
        .cloned()
        .ok_or_else(|| WcError::EntryNotFound {
            path: parent.working_path(name),
        })?;

    let lock = AdminLock::acquire(parent)?;
    let mut journal = Journal::new(parent);
    let left_local_mods = match entry.kind {
        NodeKind::File => stage_file_removal(parent, &entry, &mut journal)?,
        NodeKind::Dir => remove_dir_tree(&parent.working_path(name), config)?,
    };
    journal.delete_entry(name);
    journal.run()?;
    lock.release()?;

    info!(
        "Removed '{}' from revision control{}",
        parent.working_path(name).display(),
        if left_local_mods { " (local modifications kept)" } else { "" }
    );
    Ok(left_local_mods)
}

/// Journal the removal of one file's administrative data
fn stage_file_removal(area: &AdmArea, entry: &WorkingEntry, journal: &mut Journal) -> Result<bool> {
    let name = entry.name.as_str();
    let modified = text_modified(area, entry)?;
    journal.remove(&area.text_base_path(name))?;
    journal.remove(&area.prop_base_path(name))?;
    journal.remove(&area.props_path(name))?;
    if !modified {
        journal.remove(&area.working_path(name))?;
    }
    Ok(modified)
}

/// Remove a versioned directory tree; returns whether anything was kept
fn remove_dir_tree(dir: &Path, config: &WcConfig) -> Result<bool> {
    let area = AdmArea::new(dir, config);
    if !area.exists() {
        // Missing directories need no work; unversioned ones are kept
        return Ok(dir.exists());
    }
    recover_dir(&area)?;

    let lock = AdminLock::acquire(&area)?;
    let entries = EntryStore::load(&area)?;
    let mut journal = Journal::new(&area);
    let mut kept = false;
    for child in entries.children() {
        let child_kept = match child.kind {
            NodeKind::File => stage_file_removal(&area, child, &mut journal)?,
            NodeKind::Dir => remove_dir_tree(&area.working_path(&child.name), config)?,
        };
        kept |= child_kept;
        journal.delete_entry(&child.name);
    }
    journal.run()?;
    lock.release()?;

    // The journal lives in the administrative area, so this last step
    // cannot itself be journaled
    let adm = area.adm_dir();
    fs::remove_dir_all(adm).at(adm)?;

    let empty = fs::read_dir(dir).at(dir)?.next().is_none();
    if empty {
        fs::remove_dir(dir).at(dir)?;
        debug!("Removed directory {}", dir.display());
    }
    Ok(kept || !empty)
}
