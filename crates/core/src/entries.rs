//! Entry store: persistent per-directory metadata
//!
//! One record per versioned child name, plus the `""` record describing the
//! directory itself. The whole map is rewritten atomically on save.

use crate::adm::{atomic_write, mtime_micros, AdmArea};
use crate::error::{IoResultExt, Result, WcError};
use crate::hash::Checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Name of the record that describes the directory itself
pub const THIS_DIR: &str = "";

/// Revision number
pub type Revnum = u64;

/// Kind of versioned node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Dir,
}

/// Pending-commit intent of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    Normal,
    Add,
    Delete,
    Replace,
}

/// Metadata for one versioned name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingEntry {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub schedule: Schedule,
    /// `None` for added-not-yet-committed entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revnum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Checksum of the pristine text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    /// Working file mtime (µs) at the last time it was known to match the pristine text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_time: Option<i64>,
    /// Working props mtime (µs) at the last time they were known to match the pristine props
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_time: Option<i64>,
    #[serde(default)]
    pub copied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyfrom_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyfrom_rev: Option<Revnum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_old: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_new: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_wrk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_reject_file: Option<String>,
    /// Directory added by an update that has not been finalized yet
    #[serde(default)]
    pub incomplete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmt_rev: Option<Revnum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmt_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmt_author: Option<String>,
}

impl WorkingEntry {
    pub fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            schedule: Schedule::Normal,
            revision: None,
            url: None,
            checksum: None,
            text_time: None,
            prop_time: None,
            copied: false,
            copyfrom_url: None,
            copyfrom_rev: None,
            conflict_old: None,
            conflict_new: None,
            conflict_wrk: None,
            prop_reject_file: None,
            incomplete: false,
            cmt_rev: None,
            cmt_date: None,
            cmt_author: None,
        }
    }

    /// Text conflict artifacts are present
    pub fn has_text_conflict(&self) -> bool {
        self.conflict_old.is_some() || self.conflict_new.is_some() || self.conflict_wrk.is_some()
    }

    /// A property reject file is recorded
    pub fn has_prop_conflict(&self) -> bool {
        self.prop_reject_file.is_some()
    }

    /// Check the schedule/revision invariant
    pub fn validate(&self) -> Result<()> {
        let consistent = match self.schedule {
            Schedule::Add => self.revision.is_none() || self.copied,
            _ => self.revision.is_some() || self.incomplete || self.kind == NodeKind::Dir,
        };
        if consistent {
            Ok(())
        } else {
            Err(WcError::Serialization(format!(
                "entry '{}' has schedule {:?} with revision {:?}",
                self.name, self.schedule, self.revision
            )))
        }
    }
}

/// Timestamp value carried by a journal step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeValue {
    Clear,
    At(i64),
    /// Whatever mtime the on-disk file has when the step runs
    Working,
}

/// One attribute assignment, the payload of a `ModifyEntry` journal step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum EntryAttr {
    Kind(NodeKind),
    Schedule(Schedule),
    Revision(Option<Revnum>),
    Url(Option<String>),
    Checksum(Option<Checksum>),
    TextTime(TimeValue),
    PropTime(TimeValue),
    Copied(bool),
    CopyfromUrl(Option<String>),
    CopyfromRev(Option<Revnum>),
    ConflictOld(Option<String>),
    ConflictNew(Option<String>),
    ConflictWrk(Option<String>),
    PropRejectFile(Option<String>),
    Incomplete(bool),
    CmtRev(Option<Revnum>),
    CmtDate(Option<String>),
    CmtAuthor(Option<String>),
}

/// In-memory copy of one directory's entries file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStore {
    entries: BTreeMap<String, WorkingEntry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the entries file of a directory
    pub fn load(area: &AdmArea) -> Result<Self> {
        let path = area.entries_path();
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WcError::NotWorkingCopy {
                    path: area.dir().to_path_buf(),
                })
            }
            Err(e) => return Err(WcError::io(&path, e)),
        };
        let store: EntryStore = serde_json::from_slice(&data)
            .map_err(|e| WcError::corrupt(&path, format!("unreadable entries: {}", e)))?;
        Ok(store)
    }

    /// Atomically write the entries file
    pub fn save(&self, area: &AdmArea) -> Result<()> {
        for entry in self.entries.values() {
            entry.validate()?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        atomic_write(&area.tmp_dir(), &area.entries_path(), &data)
    }

    pub fn get(&self, name: &str) -> Option<&WorkingEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut WorkingEntry> {
        self.entries.get_mut(name)
    }

    /// The record describing the directory itself
    pub fn this_dir(&self) -> Option<&WorkingEntry> {
        self.entries.get(THIS_DIR)
    }

    pub fn insert(&mut self, entry: WorkingEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<WorkingEntry> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Child records, excluding the directory's own record
    pub fn children(&self) -> impl Iterator<Item = &WorkingEntry> {
        self.entries
            .iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply one attribute assignment, creating a file record if `name` is unknown
    ///
    /// `Working` timestamps are resolved against the on-disk state of `area`.
    pub fn modify(&mut self, area: &AdmArea, name: &str, attr: &EntryAttr) -> Result<()> {
        let entry = self.entries.entry(name.to_string()).or_insert_with(|| {
            let kind = if name.is_empty() {
                NodeKind::Dir
            } else {
                NodeKind::File
            };
            WorkingEntry::new(name, kind)
        });

        match attr {
            EntryAttr::Kind(kind) => entry.kind = *kind,
            EntryAttr::Schedule(schedule) => entry.schedule = *schedule,
            EntryAttr::Revision(rev) => entry.revision = *rev,
            EntryAttr::Url(url) => entry.url = url.clone(),
            EntryAttr::Checksum(sum) => entry.checksum = *sum,
            EntryAttr::TextTime(value) => {
                let working = area.working_path(name);
                entry.text_time = resolve_time(value, || working)?;
            }
            EntryAttr::PropTime(value) => {
                let props = area.props_path(name);
                entry.prop_time = resolve_time(value, || props)?;
            }
            EntryAttr::Copied(copied) => entry.copied = *copied,
            EntryAttr::CopyfromUrl(url) => entry.copyfrom_url = url.clone(),
            EntryAttr::CopyfromRev(rev) => entry.copyfrom_rev = *rev,
            EntryAttr::ConflictOld(v) => entry.conflict_old = v.clone(),
            EntryAttr::ConflictNew(v) => entry.conflict_new = v.clone(),
            EntryAttr::ConflictWrk(v) => entry.conflict_wrk = v.clone(),
            EntryAttr::PropRejectFile(v) => entry.prop_reject_file = v.clone(),
            EntryAttr::Incomplete(flag) => entry.incomplete = *flag,
            EntryAttr::CmtRev(rev) => entry.cmt_rev = *rev,
            EntryAttr::CmtDate(date) => entry.cmt_date = date.clone(),
            EntryAttr::CmtAuthor(author) => entry.cmt_author = author.clone(),
        }
        Ok(())
    }
}

fn resolve_time(value: &TimeValue, path: impl FnOnce() -> PathBuf) -> Result<Option<i64>> {
    match value {
        TimeValue::Clear => Ok(None),
        TimeValue::At(t) => Ok(Some(*t)),
        TimeValue::Working => mtime_micros(&path()),
    }
}

/// Read a single entry
pub fn read_entry(area: &AdmArea, name: &str) -> Result<WorkingEntry> {
    EntryStore::load(area)?
        .get(name)
        .cloned()
        .ok_or_else(|| WcError::EntryNotFound {
            path: area.working_path(name),
        })
}

/// Write a single entry, replacing any previous record
pub fn write_entry(area: &AdmArea, entry: WorkingEntry) -> Result<()> {
    let mut store = EntryStore::load(area)?;
    store.insert(entry);
    store.save(area)
}

/// Create a fresh administrative area whose directory record points at `url`
///
/// The directory starts out `incomplete` at `revision` until an edit
/// finalizes it.
pub fn init_admin_area(
    area: &AdmArea,
    url: &str,
    revision: Option<Revnum>,
    config: &crate::config::WcConfig,
) -> Result<()> {
    AdmArea::create(area.dir(), config)?;
    let mut this_dir = WorkingEntry::new(THIS_DIR, NodeKind::Dir);
    this_dir.url = Some(url.to_string());
    this_dir.revision = revision;
    this_dir.incomplete = true;
    let mut store = EntryStore::new();
    store.insert(this_dir);
    store.save(area)?;
    std::fs::create_dir_all(area.tmp_dir()).at(&area.tmp_dir())
}
