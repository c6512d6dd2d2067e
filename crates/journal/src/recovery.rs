//! Crash recovery for working-copy trees
//!
//! A directory left with a journal, a stale lock or stray staging files is
//! brought back to a consistent state by replaying its journal under the
//! lock and emptying `tmp/`.

use crate::journal::{replay, ReplayReport};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;
use wc_core::{AdmArea, AdminLock, EntryStore, IoResultExt, NodeKind, Result, WcConfig, WcError};

/// Summary of a cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub directories: usize,
    pub journals_replayed: usize,
    pub stale_locks_broken: usize,
    pub tmp_files_removed: usize,
}

/// Replay a pending journal in one directory under its lock
///
/// Fails with `Locked` if another session holds the directory.
pub fn recover_dir(area: &AdmArea) -> Result<Option<ReplayReport>> {
    if !area.has_log() {
        return Ok(None);
    }
    let lock = AdminLock::acquire(area)?;
    let report = replay(area)?;
    lock.release()?;
    Ok(report)
}

/// Recursively recover a working copy rooted at `dir`
pub fn cleanup(dir: &Path, config: &WcConfig) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    cleanup_dir(dir, config, &mut report)?;
    info!(
        "Cleanup of {}: {} directories, {} journals replayed, {} stale locks broken",
        dir.display(),
        report.directories,
        report.journals_replayed,
        report.stale_locks_broken
    );
    Ok(report)
}

fn cleanup_dir(dir: &Path, config: &WcConfig, report: &mut CleanupReport) -> Result<()> {
    let area = AdmArea::open(dir, config)?;
    report.directories += 1;

    if AdminLock::is_locked(&area) {
        if !config.locks.break_stale {
            return Err(WcError::Locked {
                path: dir.to_path_buf(),
            });
        }
        if AdminLock::break_stale(&area)? {
            report.stale_locks_broken += 1;
        }
    }

    if recover_dir(&area)?.is_some() {
        report.journals_replayed += 1;
    }
    report.tmp_files_removed += empty_tmp(&area)?;

    // Recurse only after the parent's journal ran; it may have added or
    // dropped subdirectory records
    let entries = EntryStore::load(&area)?;
    for child in entries.children().filter(|e| e.kind == NodeKind::Dir) {
        let child_dir = area.working_path(&child.name);
        if AdmArea::new(&child_dir, config).exists() {
            cleanup_dir(&child_dir, config, report)?;
        } else {
            debug!("Skipping {}: no administrative area", child_dir.display());
        }
    }
    Ok(())
}

fn empty_tmp(area: &AdmArea) -> Result<usize> {
    let tmp = area.tmp_dir();
    if !tmp.is_dir() {
        fs::create_dir_all(&tmp).at(&tmp)?;
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(&tmp).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walk failed"));
            WcError::io(&tmp, source)
        })?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir_all(path).at(path)?;
        } else {
            fs::remove_file(path).at(path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use wc_core::entries::init_admin_area;
    use wc_core::{EntryAttr, WorkingEntry};

    fn setup(dir: &Path, config: &WcConfig) -> AdmArea {
        let area = AdmArea::new(dir, config);
        init_admin_area(&area, "http://repo", Some(1), config).unwrap();
        area
    }

    #[test]
    fn test_recover_dir_replays_pending_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = WcConfig::default();
        let area = setup(temp_dir.path(), &config);

        let mut journal = Journal::new(&area);
        journal.modify("", EntryAttr::Revision(Some(9)));
        journal.write().unwrap();

        let report = recover_dir(&area).unwrap().unwrap();
        assert_eq!(report.applied, 1);
        assert!(!area.has_log());
        assert!(!AdminLock::is_locked(&area));
        let store = EntryStore::load(&area).unwrap();
        assert_eq!(store.this_dir().unwrap().revision, Some(9));
    }

    #[test]
    fn test_recover_dir_respects_live_lock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = WcConfig::default();
        let area = setup(temp_dir.path(), &config);

        let mut journal = Journal::new(&area);
        journal.modify("", EntryAttr::Revision(Some(9)));
        journal.write().unwrap();

        let _held = AdminLock::acquire(&area).unwrap();
        assert!(matches!(recover_dir(&area), Err(WcError::Locked { .. })));
        assert!(area.has_log());
    }

    #[test]
    fn test_cleanup_recurses_and_empties_tmp() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = WcConfig::default();
        let root = setup(temp_dir.path(), &config);

        let sub_dir = temp_dir.path().join("sub");
        let sub = setup(&sub_dir, &config);
        let mut stub = WorkingEntry::new("sub", NodeKind::Dir);
        stub.revision = Some(1);
        wc_core::entries::write_entry(&root, stub).unwrap();

        fs::write(root.tmp_path("stray"), b"junk").unwrap();
        fs::write(sub.lock_path(), br#"{"pid":999999,"acquired_at":0}"#).unwrap();
        let mut journal = Journal::new(&sub);
        journal.modify("", EntryAttr::Incomplete(false));
        journal.write().unwrap();

        let report = cleanup(temp_dir.path(), &config).unwrap();
        assert_eq!(report.directories, 2);
        assert_eq!(report.journals_replayed, 1);
        assert_eq!(report.stale_locks_broken, 1);
        assert_eq!(report.tmp_files_removed, 1);

        assert!(!AdminLock::is_locked(&sub));
        assert!(!sub.has_log());
        assert!(!EntryStore::load(&sub).unwrap().this_dir().unwrap().incomplete);
        assert_eq!(fs::read_dir(root.tmp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_cleanup_without_breaking_locks() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = WcConfig::default();
        config.locks.break_stale = false;
        let area = setup(temp_dir.path(), &config);
        fs::write(area.lock_path(), br#"{"pid":999999,"acquired_at":0}"#).unwrap();

        assert!(matches!(
            cleanup(temp_dir.path(), &config),
            Err(WcError::Locked { .. })
        ));
    }
}
