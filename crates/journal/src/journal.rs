//! Per-directory journal: write, fsync, replay, discard
//!
//! The log file only ever appears fully written (it is staged in `tmp/` and
//! renamed into place), so its presence means "complete but not yet
//! replayed". Replay runs every step top to bottom and then removes it.

use crate::step::JournalStep;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use wc_core::adm::{atomic_write, sync_dir};
use wc_core::{AdmArea, AdminLock, EntryAttr, EntryStore, IoResultExt, Result, WcError};

/// Observable journal state of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    NoLog,
    LogWritten,
    Replaying,
}

/// Current journal state of a directory
///
/// A log under a held lock is being replayed by the lock holder; a log
/// without one was left behind and waits for recovery.
pub fn state(area: &AdmArea) -> JournalState {
    match (area.has_log(), AdminLock::is_locked(area)) {
        (false, _) => JournalState::NoLog,
        (true, true) => JournalState::Replaying,
        (true, false) => JournalState::LogWritten,
    }
}

/// What a replay did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Steps that changed something
    pub applied: usize,
    /// Steps found already applied
    pub skipped: usize,
}

/// Accumulates steps for one directory before they are written
#[derive(Debug)]
pub struct Journal {
    area: AdmArea,
    steps: Vec<JournalStep>,
}

impl Journal {
    pub fn new(area: &AdmArea) -> Self {
        Self {
            area: area.clone(),
            steps: Vec::new(),
        }
    }

    pub fn area(&self) -> &AdmArea {
        &self.area
    }

    pub fn steps(&self) -> &[JournalStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, step: JournalStep) {
        self.steps.push(step);
    }

    /// Journal-relative form of an absolute path inside the directory
    pub fn rel(&self, path: &Path) -> Result<PathBuf> {
        self.area.relative(path).map(Path::to_path_buf)
    }

    pub fn move_file(&mut self, src: &Path, dst: &Path) -> Result<()> {
        let step = JournalStep::move_file(self.rel(src)?, self.rel(dst)?);
        self.push(step);
        Ok(())
    }

    pub fn copy_file(&mut self, src: &Path, dst: &Path) -> Result<()> {
        let step = JournalStep::copy_file(self.rel(src)?, self.rel(dst)?);
        self.push(step);
        Ok(())
    }

    pub fn remove(&mut self, path: &Path) -> Result<()> {
        let step = JournalStep::remove(self.rel(path)?);
        self.push(step);
        Ok(())
    }

    pub fn modify(&mut self, name: &str, attr: EntryAttr) {
        self.push(JournalStep::modify(name, attr));
    }

    pub fn delete_entry(&mut self, name: &str) {
        self.push(JournalStep::DeleteEntry {
            name: name.to_string(),
        });
    }

    pub fn detect_conflict(&mut self, name: &str, reject_file: &Path) -> Result<()> {
        let step = JournalStep::DetectConflict {
            name: name.to_string(),
            reject_file: self.rel(reject_file)?,
        };
        self.push(step);
        Ok(())
    }

    /// Persist the journal: serialize, fsync, rename into place
    pub fn write(&self) -> Result<()> {
        if self.area.has_log() {
            return Err(WcError::ProtocolViolation(format!(
                "'{}' already has an unreplayed journal",
                self.area.dir().display()
            )));
        }
        let data = encode(&self.steps)?;
        atomic_write(&self.area.tmp_dir(), &self.area.log_path(), &data)?;
        debug!(
            "Wrote journal for {} ({} steps)",
            self.area.dir().display(),
            self.steps.len()
        );
        Ok(())
    }

    /// Write, replay and discard the journal
    pub fn run(self) -> Result<ReplayReport> {
        if self.steps.is_empty() {
            return Ok(ReplayReport::default());
        }
        self.write()?;
        let report = execute_steps(&self.area, &self.steps)?;
        discard(&self.area)?;
        Ok(report)
    }
}

fn encode(steps: &[JournalStep]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for step in steps {
        serde_json::to_writer(&mut data, step)?;
        data.push(b'\n');
    }
    Ok(data)
}

/// Parse the pending journal of a directory, if any
pub fn read_log(area: &AdmArea) -> Result<Option<Vec<JournalStep>>> {
    let path = area.log_path();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(WcError::io(&path, e)),
    };

    let mut steps = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let step: JournalStep = serde_json::from_str(line).map_err(|e| {
            WcError::corrupt(area.dir(), format!("journal line {}: {}", lineno + 1, e))
        })?;
        steps.push(step);
    }
    Ok(Some(steps))
}

/// Replay the pending journal of a directory and discard it
///
/// Returns `None` when there was nothing to replay. The caller must hold
/// the directory's administrative lock.
pub fn replay(area: &AdmArea) -> Result<Option<ReplayReport>> {
    let steps = match read_log(area)? {
        Some(steps) => steps,
        None => return Ok(None),
    };
    info!(
        "Replaying journal for {} ({} steps)",
        area.dir().display(),
        steps.len()
    );
    let report = execute_steps(area, &steps)?;
    discard(area)?;
    Ok(Some(report))
}

fn discard(area: &AdmArea) -> Result<()> {
    let path = area.log_path();
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(WcError::io(&path, e)),
    }
    sync_dir(area.adm_dir())
}

/// Execute steps top to bottom
///
/// Entry modifications are collected in memory and written once at the
/// end; an interruption before that point is repaired by replaying the
/// whole journal again.
pub fn execute_steps(area: &AdmArea, steps: &[JournalStep]) -> Result<ReplayReport> {
    let mut replay = Replay {
        area,
        entries: None,
        report: ReplayReport::default(),
    };
    for step in steps {
        replay.step(step)?;
    }
    if let Some(entries) = &replay.entries {
        entries.save(area)?;
    }
    Ok(replay.report)
}

struct Replay<'a> {
    area: &'a AdmArea,
    entries: Option<EntryStore>,
    report: ReplayReport,
}

impl<'a> Replay<'a> {
    fn entries(&mut self) -> Result<&mut EntryStore> {
        if self.entries.is_none() {
            self.entries = Some(EntryStore::load(self.area)?);
        }
        Ok(self.entries.get_or_insert_with(EntryStore::new))
    }

    fn applied(&mut self, applied: bool) {
        if applied {
            self.report.applied += 1;
        } else {
            self.report.skipped += 1;
        }
    }

    fn step(&mut self, step: &JournalStep) -> Result<()> {
        match step {
            JournalStep::Move { src, dst } => {
                let (src, dst) = (self.area.resolve(src), self.area.resolve(dst));
                let applied = transfer(&src, &dst, |s, d| fs::rename(s, d))?;
                self.applied(applied);
            }
            JournalStep::Copy { src, dst } => {
                let (src, dst) = (self.area.resolve(src), self.area.resolve(dst));
                let applied = transfer(&src, &dst, |s, d| fs::copy(s, d).map(|_| ()))?;
                self.applied(applied);
            }
            JournalStep::Remove { path } => {
                let applied = remove_path(&self.area.resolve(path))?;
                self.applied(applied);
            }
            JournalStep::ModifyEntry { name, attr } => {
                let area = self.area;
                self.entries()?.modify(area, name, attr)?;
                self.applied(true);
            }
            JournalStep::DeleteEntry { name } => {
                let removed = self.entries()?.remove(name).is_some();
                self.applied(removed);
            }
            JournalStep::DetectConflict { name, reject_file } => {
                self.detect_conflict(name, reject_file)?;
            }
        }
        Ok(())
    }

    fn detect_conflict(&mut self, name: &str, reject_file: &Path) -> Result<()> {
        let path = self.area.resolve(reject_file);
        let len = match fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.applied(false);
                return Ok(());
            }
            Err(e) => return Err(WcError::io(&path, e)),
        };

        if len == 0 {
            fs::remove_file(&path).at(&path)?;
        } else {
            let relative = reject_file.to_string_lossy().into_owned();
            let area = self.area;
            self.entries()?
                .modify(area, name, &EntryAttr::PropRejectFile(Some(relative)))?;
        }
        self.applied(true);
        Ok(())
    }
}

/// Apply a move/copy, treating "source gone, destination present" as done
fn transfer<F>(src: &Path, dst: &Path, op: F) -> Result<bool>
where
    F: FnOnce(&Path, &Path) -> std::io::Result<()>,
{
    if src.exists() {
        op(src, dst).at(dst)?;
        return Ok(true);
    }
    if dst.exists() {
        debug!("{} already in place", dst.display());
        return Ok(false);
    }
    Err(WcError::corrupt(
        dst.parent().unwrap_or(dst),
        format!(
            "neither '{}' nor '{}' exists during journal replay",
            src.display(),
            dst.display()
        ),
    ))
}

fn remove_path(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(WcError::io(path, e)),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path).at(path)?;
    } else {
        fs::remove_file(path).at(path)?;
    }
    Ok(true)
}
