//! The update editor
//!
//! Applies a driver's tree edit to a working copy. Every finalization runs
//! under the directory's administrative lock as a journal: inputs are
//! staged in `tmp/`, the steps are written and fsynced, then replayed.
//! Directories finalize bottom-up once their reference count drops to zero.
//!
//! The same editor serves update, checkout (which first creates the
//! anchor's administrative area) and switch (which rewrites URLs).

use crate::baton::{BatonArena, CopySource, DirBaton, DirId, FileBaton, FileId};
use crate::delta::{ApplyDelta, StagedSlot, StagedText, WindowHandler};
use crate::driver::Editor;
use crate::modified::{props_modified, text_modified};
use crate::notify::{poll, CancelCheck, Notification, NotifyAction, NotifySink};
use crate::remove::remove_from_revision_control;
use journal::{recover_dir, Journal};
use merge::{
    diff3_command, format_rejects, merge_props, merge_text, ChangeState, ConflictLabels,
    MergeOptions, MergeOutcome,
};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use wc_core::adm::{is_valid_entry_name, unique_path};
use wc_core::entries::init_admin_area;
use wc_core::props::{load_props, write_props};
use wc_core::{
    hash_bytes, AdmArea, AdminLock, Checksum, EntryAttr, EntryStore, IoResultExt, NodeKind,
    PropChange, Result, Revnum, Schedule, TimeValue, WcConfig, WcError, WorkingEntry, THIS_DIR,
};

/// Prefix of properties that carry entry metadata instead of versioned data
pub const ENTRY_PROP_PREFIX: &str = "entry:";
pub const PROP_COMMITTED_REV: &str = "entry:committed-rev";
pub const PROP_COMMITTED_DATE: &str = "entry:committed-date";
pub const PROP_LAST_AUTHOR: &str = "entry:last-author";

/// Reject file stem for directory property conflicts
const DIR_REJECT_STEM: &str = "dir_conflicts";

/// Callbacks for an edit session
#[derive(Default)]
pub struct EditorOptions {
    notify: Option<Box<dyn NotifySink>>,
    cancel: Option<Box<dyn CancelCheck>>,
}

impl EditorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notify(mut self, sink: impl NotifySink + 'static) -> Self {
        self.notify = Some(Box::new(sink));
        self
    }

    pub fn with_cancel(mut self, check: impl CancelCheck + 'static) -> Self {
        self.cancel = Some(Box::new(check));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EditMode {
    Update,
    Checkout { url: String },
    Switch { url: String },
}

/// Editor that moves a working copy to a target revision
pub struct UpdateEditor {
    anchor: PathBuf,
    config: WcConfig,
    target_revision: Revnum,
    mode: EditMode,
    arena: BatonArena,
    notify: Option<Box<dyn NotifySink>>,
    cancel: Option<Box<dyn CancelCheck>>,
    root_opened: bool,
    edit_closed: bool,
}

/// Editor updating the working copy at `anchor`
pub fn update_editor(
    anchor: &Path,
    target_revision: Revnum,
    config: &WcConfig,
    options: EditorOptions,
) -> Result<UpdateEditor> {
    config.validate()?;
    AdmArea::open(anchor, config)?;
    Ok(UpdateEditor::new(anchor, target_revision, config, EditMode::Update, options))
}

/// Editor populating a new working copy of `url` at `anchor`
///
/// An anchor that is already a working copy of the same URL is resumed.
pub fn checkout_editor(
    anchor: &Path,
    url: &str,
    target_revision: Revnum,
    config: &WcConfig,
    options: EditorOptions,
) -> Result<UpdateEditor> {
    config.validate()?;
    let area = AdmArea::new(anchor, config);
    if area.exists() {
        let entries = EntryStore::load(&area)?;
        let existing = entries.this_dir().and_then(|e| e.url.as_deref());
        if existing != Some(url) {
            return Err(WcError::Obstructed {
                path: anchor.to_path_buf(),
            });
        }
        debug!("Resuming checkout into {}", anchor.display());
    } else {
        if anchor.exists() && !anchor.is_dir() {
            return Err(WcError::Obstructed {
                path: anchor.to_path_buf(),
            });
        }
        fs::create_dir_all(anchor).at(anchor)?;
        init_admin_area(&area, url, Some(target_revision), config)?;
    }
    let mode = EditMode::Checkout {
        url: url.to_string(),
    };
    Ok(UpdateEditor::new(anchor, target_revision, config, mode, options))
}

/// Editor moving the working copy at `anchor` to `switch_url`
pub fn switch_editor(
    anchor: &Path,
    switch_url: &str,
    target_revision: Revnum,
    config: &WcConfig,
    options: EditorOptions,
) -> Result<UpdateEditor> {
    config.validate()?;
    AdmArea::open(anchor, config)?;
    let mode = EditMode::Switch {
        url: switch_url.to_string(),
    };
    Ok(UpdateEditor::new(anchor, target_revision, config, mode, options))
}

fn child_url(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Entry attribute carried by an `entry:` property, if it is a known one
fn entry_prop_attr(name: &str, value: Option<&str>) -> Option<EntryAttr> {
    match name {
        PROP_COMMITTED_REV => Some(EntryAttr::CmtRev(value.and_then(|v| v.parse().ok()))),
        PROP_COMMITTED_DATE => Some(EntryAttr::CmtDate(value.map(str::to_string))),
        PROP_LAST_AUTHOR => Some(EntryAttr::CmtAuthor(value.map(str::to_string))),
        _ => None,
    }
}

/// File names of the three backups kept for a text conflict
struct ConflictBackups {
    wrk: PathBuf,
    old: PathBuf,
    new: PathBuf,
}

impl ConflictBackups {
    fn pick(dir: &Path, name: &str, old_rev: Option<Revnum>, new_rev: Revnum) -> Self {
        let wrk = unique_path(dir, name, ".mine");
        let old = unique_path(dir, name, &format!(".r{}", old_rev.unwrap_or(0)));
        let mut new = unique_path(dir, name, &format!(".r{}", new_rev));
        if new == old {
            new = unique_path(dir, name, &format!(".r{}.new", new_rev));
        }
        Self { wrk, old, new }
    }

    fn attrs(&self) -> [EntryAttr; 3] {
        let file_name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().into_owned());
        [
            EntryAttr::ConflictOld(file_name(&self.old)),
            EntryAttr::ConflictNew(file_name(&self.new)),
            EntryAttr::ConflictWrk(file_name(&self.wrk)),
        ]
    }
}

/// A finalization whose inputs are staged and whose journal is built
struct Staged {
    journal: Journal,
    lock: AdminLock,
    content_state: ChangeState,
    prop_state: ChangeState,
}

impl Staged {
    /// Write, replay and discard the journal, then unlock
    fn run(self) -> Result<(ChangeState, ChangeState)> {
        self.journal.run()?;
        self.lock.release()?;
        Ok((self.content_state, self.prop_state))
    }
}

impl UpdateEditor {
    fn new(
        anchor: &Path,
        target_revision: Revnum,
        config: &WcConfig,
        mode: EditMode,
        options: EditorOptions,
    ) -> Self {
        Self {
            anchor: anchor.to_path_buf(),
            config: config.clone(),
            target_revision,
            mode,
            arena: BatonArena::default(),
            notify: options.notify,
            cancel: options.cancel,
            root_opened: false,
            edit_closed: false,
        }
    }

    pub fn target_revision(&self) -> Revnum {
        self.target_revision
    }

    /// Directory and file batons not yet freed
    pub fn live_batons(&self) -> (usize, usize) {
        self.arena.live()
    }

    fn emit(&mut self, notification: Notification) {
        if let Some(sink) = self.notify.as_mut() {
            sink.notify(&notification);
        }
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if is_valid_entry_name(name, &self.config) {
            Ok(())
        } else {
            Err(WcError::ProtocolViolation(format!(
                "'{}' is not a valid entry name",
                name
            )))
        }
    }

    /// Area, URL and path of an open directory that still accepts children
    fn open_parent(&self, parent: DirId) -> Result<(AdmArea, String, bool)> {
        let baton = self.arena.dir(parent)?;
        if baton.closed {
            return Err(WcError::ProtocolViolation(format!(
                "'{}' is already closed",
                baton.path.display()
            )));
        }
        Ok((baton.area.clone(), baton.url.clone(), baton.resumed))
    }

    /// Drop one reference on `dir`, finalizing up the tree as counts reach zero
    fn release_dir(&mut self, dir: DirId) -> Result<()> {
        let mut current = dir;
        let mut outcome = Ok(());
        loop {
            if !self.arena.decrement(current)? {
                return outcome;
            }
            let baton = self.arena.take_dir(current)?;
            let parent = baton.parent;
            let path = baton.path.clone();
            let finalized = self.finalize_directory(baton);
            match parent {
                Some(parent) => {
                    if finalized.is_err() {
                        self.arena.poison(parent, path);
                    }
                    if outcome.is_ok() {
                        outcome = finalized;
                    }
                    current = parent;
                }
                None => return outcome.and(finalized),
            }
        }
    }

    fn finalize_directory(&mut self, baton: DirBaton) -> Result<()> {
        if let Some(child) = &baton.failed_child {
            return Err(WcError::ChildFailed {
                path: child.clone(),
            });
        }
        let target = self.target_revision;
        let (_, prop_state) = self.stage_directory(&baton)?.run()?;
        debug!("Finalized directory {} at r{}", baton.path.display(), target);

        if baton.added || prop_state != ChangeState::Inapplicable {
            let action =
                Notification::action_for(baton.added, ChangeState::Inapplicable, prop_state);
            self.emit(Notification {
                path: baton.path.clone(),
                action,
                kind: NodeKind::Dir,
                content_state: ChangeState::Inapplicable,
                prop_state,
                revision: Some(target),
            });
        }
        Ok(())
    }

    /// Lock a directory and build the journal that brings it to the target
    fn stage_directory(&self, baton: &DirBaton) -> Result<Staged> {
        let area = &baton.area;
        let target = self.target_revision;

        let lock = AdminLock::acquire(area)?;
        let entries = EntryStore::load(area)?;
        let this_dir = entries.this_dir().cloned();
        let mut journal = Journal::new(area);

        let prop_state = self.stage_prop_merge(
            area,
            THIS_DIR,
            this_dir.as_ref(),
            &baton.prop_changes,
            &mut journal,
        )?;

        journal.modify(THIS_DIR, EntryAttr::Kind(NodeKind::Dir));
        journal.modify(THIS_DIR, EntryAttr::Revision(Some(target)));
        journal.modify(THIS_DIR, EntryAttr::Url(Some(baton.url.clone())));
        journal.modify(THIS_DIR, EntryAttr::Incomplete(false));
        if let Some(copy) = &baton.copy_from {
            journal.modify(THIS_DIR, EntryAttr::CopyfromUrl(Some(copy.url.clone())));
            journal.modify(THIS_DIR, EntryAttr::CopyfromRev(Some(copy.revision)));
        }
        for attr in &baton.entry_changes {
            journal.modify(THIS_DIR, attr.clone());
        }

        // Files the driver did not touch are at the target revision too
        for child in entries.children() {
            if child.kind == NodeKind::File
                && child.schedule == Schedule::Normal
                && child.revision != Some(target)
            {
                journal.modify(&child.name, EntryAttr::Revision(Some(target)));
                let url = child_url(&baton.url, &child.name);
                journal.modify(&child.name, EntryAttr::Url(Some(url)));
            }
        }

        Ok(Staged {
            journal,
            lock,
            content_state: ChangeState::Inapplicable,
            prop_state,
        })
    }

    /// Journal a three-way merge of queued property changes for `name`
    fn stage_prop_merge(
        &self,
        area: &AdmArea,
        name: &str,
        entry: Option<&WorkingEntry>,
        changes: &[PropChange],
        journal: &mut Journal,
    ) -> Result<ChangeState> {
        if changes.is_empty() {
            return Ok(ChangeState::Inapplicable);
        }
        let local_mods = props_modified(area, name, entry)?;
        let base = load_props(&area.prop_base_path(name))?;
        let working = load_props(&area.props_path(name))?;
        let merged = merge_props(&base, &working, changes);

        let staged_working = area.tmp_path("props");
        write_props(&staged_working, &merged.working)?;
        journal.move_file(&staged_working, &area.props_path(name))?;
        let staged_base = area.tmp_path("prop-base");
        write_props(&staged_base, &merged.base)?;
        journal.move_file(&staged_base, &area.prop_base_path(name))?;

        if !merged.has_conflicts() {
            if !local_mods {
                journal.modify(name, EntryAttr::PropTime(TimeValue::Working));
            }
            return Ok(merged.state);
        }

        // Rejects are appended to the entry's existing reject file
        let reject_path = match entry.and_then(|e| e.prop_reject_file.as_ref()) {
            Some(existing) => area.working_path(existing),
            None => {
                let stem = if name.is_empty() { DIR_REJECT_STEM } else { name };
                unique_path(area.dir(), stem, ".prej")
            }
        };
        let mut reject = match fs::read(&reject_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(WcError::io(&reject_path, e)),
        };
        reject.extend_from_slice(format_rejects(&merged.rejects).as_bytes());
        let staged_reject = area.tmp_path("prej");
        fs::write(&staged_reject, &reject).at(&staged_reject)?;
        journal.move_file(&staged_reject, &reject_path)?;
        journal.detect_conflict(name, &reject_path)?;

        info!(
            "Property conflict on {} ({} rejected)",
            area.working_path(name).display(),
            merged.rejects.len()
        );
        Ok(merged.state)
    }

    fn finalize_file(&mut self, baton: &FileBaton, expected: Option<Checksum>) -> Result<()> {
        let target = self.target_revision;
        let (content_state, prop_state) = self.stage_file(baton, expected)?.run()?;
        debug!(
            "Finalized file {} at r{} (text {:?}, props {:?})",
            baton.path.display(),
            target,
            content_state,
            prop_state
        );

        let action = Notification::action_for(baton.added, content_state, prop_state);
        self.emit(Notification {
            path: baton.path.clone(),
            action,
            kind: NodeKind::File,
            content_state,
            prop_state,
            revision: Some(target),
        });
        Ok(())
    }

    /// Lock the parent directory, merge, and build the journal for a file
    fn stage_file(&self, baton: &FileBaton, expected: Option<Checksum>) -> Result<Staged> {
        let (area, dir_url) = {
            let dir = self.arena.dir(baton.parent)?;
            (dir.area.clone(), dir.url.clone())
        };
        let name = baton.name.as_str();
        let target = self.target_revision;

        let staged = match &baton.text {
            Some(slot) => Some(slot.lock().take().ok_or_else(|| {
                WcError::ProtocolViolation(format!(
                    "delta stream for '{}' was not finished",
                    baton.path.display()
                ))
            })?),
            // An added file without text is empty
            None if baton.added => Some(stage_empty(&area, name)?),
            None => None,
        };
        if let (Some(staged), Some(expected)) = (&staged, expected) {
            if staged.checksum != expected {
                let _ = fs::remove_file(&staged.path);
                return Err(WcError::ChecksumMismatch {
                    path: baton.path.clone(),
                    expected: expected.to_hex(),
                    actual: staged.checksum.to_hex(),
                });
            }
        }

        let lock = AdminLock::acquire(&area)?;
        let entries = EntryStore::load(&area)?;
        let entry = entries.get(name).cloned();
        let mut journal = Journal::new(&area);

        let locally_modified = match (&entry, baton.added) {
            (Some(entry), false) => text_modified(&area, entry)?,
            _ => false,
        };

        let mut content_state = ChangeState::Inapplicable;
        if let Some(staged) = &staged {
            if locally_modified {
                content_state =
                    self.stage_text_merge(&area, name, entry.as_ref(), staged, &mut journal)?;
            } else {
                journal.copy_file(&staged.path, &baton.path)?;
                journal.move_file(&staged.path, &area.text_base_path(name))?;
                content_state = ChangeState::Changed;
            }
        }

        let prop_state = self.stage_prop_merge(
            &area,
            name,
            entry.as_ref(),
            &baton.prop_changes,
            &mut journal,
        )?;

        journal.modify(name, EntryAttr::Kind(NodeKind::File));
        journal.modify(name, EntryAttr::Schedule(Schedule::Normal));
        journal.modify(name, EntryAttr::Revision(Some(target)));
        journal.modify(name, EntryAttr::Url(Some(child_url(&dir_url, name))));
        if let Some(staged) = &staged {
            journal.modify(name, EntryAttr::Checksum(Some(staged.checksum)));
            let text_time = if locally_modified {
                TimeValue::Clear
            } else {
                TimeValue::Working
            };
            journal.modify(name, EntryAttr::TextTime(text_time));
        }
        if let Some(copy) = &baton.copy_from {
            journal.modify(name, EntryAttr::CopyfromUrl(Some(copy.url.clone())));
            journal.modify(name, EntryAttr::CopyfromRev(Some(copy.revision)));
        }
        for attr in &baton.entry_changes {
            journal.modify(name, attr.clone());
        }

        Ok(Staged {
            journal,
            lock,
            content_state,
            prop_state,
        })
    }

    /// Merge a locally modified file with its new text and journal the result
    ///
    /// The merge runs now, on copies in `tmp/`, so the journal only moves
    /// finished files into place. A failing merge helper leaves nothing to
    /// replay.
    fn stage_text_merge(
        &self,
        area: &AdmArea,
        name: &str,
        entry: Option<&WorkingEntry>,
        staged: &StagedText,
        journal: &mut Journal,
    ) -> Result<ChangeState> {
        let working = area.working_path(name);
        let base_path = area.text_base_path(name);
        let old_rev = entry.and_then(|e| e.revision);
        let backups = ConflictBackups::pick(area.dir(), name, old_rev, self.target_revision);

        // Merge inputs are copied aside so replay never reads a file it rewrote
        let mine_copy = area.tmp_path("mine");
        fs::copy(&working, &mine_copy).at(&mine_copy)?;
        let older_copy = area.tmp_path("older");
        match fs::copy(&base_path, &older_copy) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                File::create(&older_copy).at(&older_copy)?;
            }
            Err(e) => return Err(WcError::io(&base_path, e)),
        }
        let merged_path = area.tmp_path("merged");

        let outcome =
            match self.merge_staged(area, old_rev, &mine_copy, &older_copy, staged, &merged_path) {
                Ok(outcome) => outcome,
                Err(e) => {
                    for path in [&mine_copy, &older_copy, &merged_path, &staged.path] {
                        let _ = fs::remove_file(path);
                    }
                    return Err(e);
                }
            };

        match outcome {
            MergeOutcome::Unchanged | MergeOutcome::Merged => {
                if outcome == MergeOutcome::Merged {
                    journal.move_file(&merged_path, &working)?;
                }
                journal.move_file(&staged.path, &base_path)?;
                journal.remove(&mine_copy)?;
                journal.remove(&older_copy)?;
            }
            MergeOutcome::Conflicted | MergeOutcome::NoMerge => {
                journal.move_file(&mine_copy, &backups.wrk)?;
                journal.move_file(&older_copy, &backups.old)?;
                journal.copy_file(&staged.path, &backups.new)?;
                // Binary files keep the local text untouched
                if outcome == MergeOutcome::Conflicted {
                    journal.move_file(&merged_path, &working)?;
                }
                journal.move_file(&staged.path, &base_path)?;
                for attr in backups.attrs() {
                    journal.modify(name, attr);
                }
                info!("Text conflict on {}", working.display());
            }
        }
        Ok(outcome.into())
    }

    /// Three-way merge of the copies in `tmp/`, leaving merged text at `output`
    fn merge_staged(
        &self,
        area: &AdmArea,
        old_rev: Option<Revnum>,
        mine: &Path,
        older: &Path,
        yours: &StagedText,
        output: &Path,
    ) -> Result<MergeOutcome> {
        let labels = ConflictLabels::for_revisions(old_rev, self.target_revision).with_overrides(
            self.config.merge.labels.mine.as_deref(),
            self.config.merge.labels.older.as_deref(),
            self.config.merge.labels.theirs.as_deref(),
        );

        let external = diff3_command(
            &self.config.merge,
            &labels,
            area.relative(mine)?,
            area.relative(older)?,
            area.relative(&yours.path)?,
        );
        if let Some(command) = external {
            return command.run(area.dir(), output);
        }

        let options = MergeOptions {
            labels,
            show_base: self.config.merge.show_base,
        };
        let result = merge_text(
            &fs::read(older).at(older)?,
            &fs::read(mine).at(mine)?,
            &fs::read(&yours.path).at(&yours.path)?,
            &options,
        );
        if matches!(result.outcome, MergeOutcome::Merged | MergeOutcome::Conflicted) {
            fs::write(output, &result.merged).at(output)?;
        }
        if result.conflicts > 0 {
            debug!("{} conflict regions in {}", result.conflicts, mine.display());
        }
        Ok(result.outcome)
    }
}

/// Stage an empty text for a file added without a delta
fn stage_empty(area: &AdmArea, name: &str) -> Result<StagedText> {
    let path = area.tmp_path(name);
    let file = File::create(&path).at(&path)?;
    file.sync_all().at(&path)?;
    Ok(StagedText {
        path,
        checksum: hash_bytes(b""),
        len: 0,
    })
}

impl Editor for UpdateEditor {
    fn set_target_revision(&mut self, revision: Revnum) -> Result<()> {
        self.target_revision = revision;
        Ok(())
    }

    fn open_root(&mut self, _base_revision: Option<Revnum>) -> Result<DirId> {
        if self.root_opened {
            return Err(WcError::ProtocolViolation("open_root called twice".into()));
        }
        poll(&mut self.cancel)?;

        let area = AdmArea::open(&self.anchor, &self.config)?;
        recover_dir(&area)?;
        let entries = EntryStore::load(&area)?;
        let url = match &self.mode {
            EditMode::Checkout { url } | EditMode::Switch { url } => url.clone(),
            EditMode::Update => entries
                .this_dir()
                .and_then(|e| e.url.clone())
                .ok_or_else(|| WcError::corrupt(&self.anchor, "directory has no URL"))?,
        };

        let baton = DirBaton::new(THIS_DIR, self.anchor.clone(), area, url, None);
        let id = self.arena.make_dir(baton)?;
        self.root_opened = true;
        info!(
            "Editing {} towards r{}",
            self.anchor.display(),
            self.target_revision
        );
        Ok(id)
    }

    fn delete_entry(&mut self, name: &str, parent: DirId) -> Result<()> {
        poll(&mut self.cancel)?;
        self.check_name(name)?;
        let (area, _, _) = self.open_parent(parent)?;

        let kind = EntryStore::load(&area)?
            .get(name)
            .map(|e| e.kind)
            .ok_or_else(|| WcError::EntryNotFound {
                path: area.working_path(name),
            })?;
        remove_from_revision_control(&area, name, &self.config)?;

        let target = self.target_revision;
        self.emit(Notification {
            path: area.working_path(name),
            action: NotifyAction::Deleted,
            kind,
            content_state: ChangeState::Inapplicable,
            prop_state: ChangeState::Inapplicable,
            revision: Some(target),
        });
        Ok(())
    }

    fn add_directory(
        &mut self,
        name: &str,
        parent: DirId,
        copy_from: Option<CopySource>,
    ) -> Result<DirId> {
        poll(&mut self.cancel)?;
        self.check_name(name)?;
        let (parent_area, parent_url, _) = self.open_parent(parent)?;
        let path = parent_area.working_path(name);
        let url = child_url(&parent_url, name);
        let area = AdmArea::new(&path, &self.config);

        // Obstruction is decided before any baton exists, so the parent's
        // count is left alone
        let resumed = match fs::symlink_metadata(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(WcError::io(&path, e)),
            Ok(meta) if meta.is_dir() && area.exists() => {
                let entries = EntryStore::load(&area)?;
                match entries.this_dir() {
                    Some(this_dir) if this_dir.incomplete && this_dir.url.as_deref() == Some(&url) => true,
                    _ => return Err(WcError::Obstructed { path }),
                }
            }
            Ok(_) => return Err(WcError::Obstructed { path }),
        };
        if !resumed && EntryStore::load(&parent_area)?.contains(name) {
            return Err(WcError::EntryExists { path });
        }

        if resumed {
            debug!("Resuming incomplete directory {}", path.display());
            recover_dir(&area)?;
        } else {
            fs::create_dir(&path).at(&path)?;
            init_admin_area(&area, &url, Some(self.target_revision), &self.config)?;
        }

        // Stub record in the parent so recovery can find the new directory
        let lock = AdminLock::acquire(&parent_area)?;
        let mut journal = Journal::new(&parent_area);
        journal.modify(name, EntryAttr::Kind(NodeKind::Dir));
        journal.modify(name, EntryAttr::Schedule(Schedule::Normal));
        journal.run()?;
        lock.release()?;

        let mut baton = DirBaton::new(name, path, area, url, Some(parent));
        baton.added = true;
        baton.resumed = resumed;
        baton.copy_from = copy_from;
        self.arena.make_dir(baton)
    }

    fn open_directory(&mut self, name: &str, parent: DirId) -> Result<DirId> {
        poll(&mut self.cancel)?;
        self.check_name(name)?;
        let (parent_area, parent_url, _) = self.open_parent(parent)?;
        let path = parent_area.working_path(name);

        let is_dir = EntryStore::load(&parent_area)?
            .get(name)
            .map(|e| e.kind == NodeKind::Dir)
            .unwrap_or(false);
        if !is_dir {
            return Err(WcError::EntryNotFound { path });
        }
        let area = AdmArea::open(&path, &self.config)?;
        recover_dir(&area)?;

        let url = child_url(&parent_url, name);
        let baton = DirBaton::new(name, path, area, url, Some(parent));
        self.arena.make_dir(baton)
    }

    fn change_dir_prop(&mut self, dir: DirId, name: &str, value: Option<&str>) -> Result<()> {
        let baton = self.arena.dir_mut(dir)?;
        if baton.closed {
            return Err(WcError::ProtocolViolation(format!(
                "property change on closed directory '{}'",
                baton.path.display()
            )));
        }
        if name.starts_with(ENTRY_PROP_PREFIX) {
            match entry_prop_attr(name, value) {
                Some(attr) => baton.entry_changes.push(attr),
                None => debug!("Ignoring entry property {}", name),
            }
            return Ok(());
        }
        baton.prop_changes.push(PropChange {
            name: name.to_string(),
            value: value.map(str::to_string),
        });
        Ok(())
    }

    fn close_directory(&mut self, dir: DirId) -> Result<()> {
        let baton = self.arena.dir_mut(dir)?;
        if baton.closed {
            return Err(WcError::ProtocolViolation(format!(
                "'{}' closed twice",
                baton.path.display()
            )));
        }
        if baton.open_subdirs > 0 {
            return Err(WcError::ProtocolViolation(format!(
                "'{}' closed with {} subdirectories still open",
                baton.path.display(),
                baton.open_subdirs
            )));
        }
        baton.closed = true;
        if let Some(parent) = baton.parent {
            let parent = self.arena.dir_mut(parent)?;
            parent.open_subdirs = parent.open_subdirs.saturating_sub(1);
        }
        self.release_dir(dir)
    }

    fn add_file(
        &mut self,
        name: &str,
        parent: DirId,
        copy_from: Option<CopySource>,
    ) -> Result<FileId> {
        poll(&mut self.cancel)?;
        self.check_name(name)?;
        let (area, _, parent_resumed) = self.open_parent(parent)?;
        let path = area.working_path(name);

        let existing = EntryStore::load(&area)?.get(name).map(|e| e.kind);
        // A resumed directory may already hold files from the interrupted
        // edit; they are overwritten
        let resumed = parent_resumed && existing == Some(NodeKind::File);
        if existing.is_some() && !resumed {
            return Err(WcError::EntryExists { path });
        }
        if !resumed && fs::symlink_metadata(&path).is_ok() {
            return Err(WcError::Obstructed { path });
        }

        let mut baton = FileBaton::new(name, path, parent);
        baton.added = true;
        baton.copy_from = copy_from;
        self.arena.make_file(baton)
    }

    fn open_file(&mut self, name: &str, parent: DirId) -> Result<FileId> {
        poll(&mut self.cancel)?;
        self.check_name(name)?;
        let (area, _, _) = self.open_parent(parent)?;
        let path = area.working_path(name);

        let is_file = EntryStore::load(&area)?
            .get(name)
            .map(|e| e.kind == NodeKind::File)
            .unwrap_or(false);
        if !is_file {
            return Err(WcError::EntryNotFound { path });
        }
        self.arena.make_file(FileBaton::new(name, path, parent))
    }

    fn apply_textdelta(
        &mut self,
        file: FileId,
        base_checksum: Option<Checksum>,
    ) -> Result<Box<dyn WindowHandler>> {
        let (parent, name, added) = {
            let baton = self.arena.file(file)?;
            if baton.text.is_some() {
                return Err(WcError::ProtocolViolation(format!(
                    "second delta stream for '{}'",
                    baton.path.display()
                )));
            }
            (baton.parent, baton.name.clone(), baton.added)
        };
        let area = self.arena.dir(parent)?.area.clone();

        let source = if added {
            Vec::new()
        } else {
            let base_path = area.text_base_path(&name);
            let source = match fs::read(&base_path) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(WcError::io(&base_path, e)),
            };
            let actual = hash_bytes(&source);
            let recorded = EntryStore::load(&area)?
                .get(&name)
                .and_then(|e| e.checksum);
            for expected in [recorded, base_checksum].into_iter().flatten() {
                if expected != actual {
                    return Err(WcError::CorruptTextBase {
                        path: base_path,
                        expected: expected.to_hex(),
                        actual: actual.to_hex(),
                    });
                }
            }
            source
        };

        let slot: StagedSlot = Arc::new(Mutex::new(None));
        let sink = ApplyDelta::new(source, area.tmp_path(&name), slot.clone())?;
        self.arena.file_mut(file)?.text = Some(slot);
        Ok(Box::new(sink))
    }

    fn change_file_prop(&mut self, file: FileId, name: &str, value: Option<&str>) -> Result<()> {
        let baton = self.arena.file_mut(file)?;
        if name.starts_with(ENTRY_PROP_PREFIX) {
            match entry_prop_attr(name, value) {
                Some(attr) => baton.entry_changes.push(attr),
                None => debug!("Ignoring entry property {}", name),
            }
            return Ok(());
        }
        baton.prop_changes.push(PropChange {
            name: name.to_string(),
            value: value.map(str::to_string),
        });
        Ok(())
    }

    fn close_file(&mut self, file: FileId, text_checksum: Option<Checksum>) -> Result<()> {
        let baton = self.arena.take_file(file)?;
        let parent = baton.parent;
        let finalized = self.finalize_file(&baton, text_checksum);
        if finalized.is_err() {
            self.arena.poison(parent, baton.path.clone());
        }
        let released = self.release_dir(parent);
        finalized.and(released)
    }

    fn close_edit(&mut self) -> Result<()> {
        if self.edit_closed {
            return Err(WcError::ProtocolViolation("close_edit called twice".into()));
        }
        if !self.root_opened {
            return Err(WcError::ProtocolViolation("close_edit before open_root".into()));
        }
        let (dirs, files) = self.arena.live();
        if dirs > 0 || files > 0 {
            return Err(WcError::ProtocolViolation(format!(
                "close_edit with {} directories and {} files still open",
                dirs, files
            )));
        }
        self.edit_closed = true;
        info!(
            "{} is at r{}",
            self.anchor.display(),
            self.target_revision
        );
        Ok(())
    }

    fn abort_edit(&mut self) -> Result<()> {
        let (dirs, files) = self.arena.live();
        if dirs > 0 || files > 0 {
            debug!("Aborting edit with {} directories and {} files open", dirs, files);
        }
        self.arena.clear();
        self.edit_closed = true;
        Ok(())
    }
}
