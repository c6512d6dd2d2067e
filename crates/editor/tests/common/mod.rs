//! Common utilities for editor integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use editor::{
    checkout_editor, drive, update_editor, EditOp, EditorOptions, Notification, UpdateEditor,
};
use wc_core::props::{load_props, write_props};
use wc_core::{hash_bytes, AdmArea, EntryStore, PropList, Result, Revnum, WcConfig, WorkingEntry};

pub const REPO_URL: &str = "http://repo/trunk";

/// Builder for edit scripts with automatically allocated handles
pub struct Script {
    ops: Vec<EditOp>,
    next_id: u32,
}

impl Script {
    pub const ROOT: u32 = 0;

    /// Script opening the root towards `revision`
    pub fn new(revision: Revnum) -> Self {
        Self {
            ops: vec![
                EditOp::SetTargetRevision { revision },
                EditOp::OpenRoot {
                    id: Self::ROOT,
                    base_revision: None,
                },
            ],
            next_id: 1,
        }
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_dir(&mut self, parent: u32, name: &str) -> u32 {
        let id = self.id();
        self.ops.push(EditOp::AddDirectory {
            parent,
            name: name.to_string(),
            id,
            copy_from: None,
        });
        id
    }

    pub fn open_dir(&mut self, parent: u32, name: &str) -> u32 {
        let id = self.id();
        self.ops.push(EditOp::OpenDirectory {
            parent,
            name: name.to_string(),
            id,
        });
        id
    }

    pub fn close_dir(&mut self, dir: u32) -> &mut Self {
        self.ops.push(EditOp::CloseDirectory { dir });
        self
    }

    pub fn dir_prop(&mut self, dir: u32, name: &str, value: Option<&str>) -> &mut Self {
        self.ops.push(EditOp::ChangeDirProp {
            dir,
            name: name.to_string(),
            value: value.map(str::to_string),
        });
        self
    }

    /// Add, fill and close a file
    pub fn add_file(&mut self, parent: u32, name: &str, text: &str) -> &mut Self {
        self.add_file_with_props(parent, name, text, &[])
    }

    pub fn add_file_with_props(
        &mut self,
        parent: u32,
        name: &str,
        text: &str,
        props: &[(&str, &str)],
    ) -> &mut Self {
        let id = self.id();
        self.ops.push(EditOp::AddFile {
            parent,
            name: name.to_string(),
            id,
            copy_from: None,
        });
        self.text_and_close(id, Some(text), props)
    }

    /// Open, replace the text of, and close a file
    pub fn update_file(&mut self, parent: u32, name: &str, text: &str) -> &mut Self {
        let id = self.open_file(parent, name);
        self.text_and_close(id, Some(text), &[])
    }

    /// Open, change one property of, and close a file
    pub fn file_prop(&mut self, parent: u32, name: &str, prop: &str, value: Option<&str>) -> &mut Self {
        let id = self.open_file(parent, name);
        self.ops.push(EditOp::ChangeFileProp {
            file: id,
            name: prop.to_string(),
            value: value.map(str::to_string),
        });
        self.ops.push(EditOp::CloseFile {
            file: id,
            checksum: None,
        });
        self
    }

    pub fn open_file(&mut self, parent: u32, name: &str) -> u32 {
        let id = self.id();
        self.ops.push(EditOp::OpenFile {
            parent,
            name: name.to_string(),
            id,
        });
        id
    }

    fn text_and_close(&mut self, file: u32, text: Option<&str>, props: &[(&str, &str)]) -> &mut Self {
        if let Some(text) = text {
            self.ops.push(EditOp::ApplyText {
                file,
                base_checksum: None,
                text: text.to_string(),
            });
        }
        for (name, value) in props {
            self.ops.push(EditOp::ChangeFileProp {
                file,
                name: name.to_string(),
                value: Some(value.to_string()),
            });
        }
        self.ops.push(EditOp::CloseFile {
            file,
            checksum: text.map(|t| hash_bytes(t.as_bytes())),
        });
        self
    }

    pub fn delete(&mut self, parent: u32, name: &str) -> &mut Self {
        self.ops.push(EditOp::DeleteEntry {
            parent,
            name: name.to_string(),
        });
        self
    }

    pub fn push(&mut self, op: EditOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Close the root and the edit
    pub fn finish(mut self) -> Vec<EditOp> {
        self.ops.push(EditOp::CloseDirectory { dir: Self::ROOT });
        self.ops.push(EditOp::CloseEdit);
        self.ops
    }
}

/// Notifications collected from an editor
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<Notification>>>);

impl Recorder {
    pub fn options(&self) -> EditorOptions {
        let seen = self.0.clone();
        EditorOptions::new().with_notify(move |n: &Notification| seen.borrow_mut().push(n.clone()))
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    /// Notification for the node at `path`, if any
    pub fn find(notifications: &[Notification], path: &Path) -> Option<Notification> {
        notifications.iter().find(|n| n.path == path).cloned()
    }
}

/// A working copy inside a temporary directory
pub struct TestWc {
    _temp: tempfile::TempDir,
    pub root: PathBuf,
    pub config: WcConfig,
}

impl TestWc {
    /// Empty directory, not yet a working copy
    pub fn empty() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("wc");
        Self {
            _temp: temp,
            root,
            config: WcConfig::default(),
        }
    }

    /// Working copy checked out at r1 with the given root files
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let wc = Self::empty();
        let mut script = Script::new(1);
        for (name, text) in files {
            script.add_file(Script::ROOT, name, text);
        }
        wc.checkout(script.finish()).unwrap();
        wc
    }

    pub fn checkout(&self, ops: Vec<EditOp>) -> Result<Vec<Notification>> {
        let recorder = Recorder::default();
        let mut editor = checkout_editor(&self.root, REPO_URL, 0, &self.config, recorder.options())?;
        drive(&mut editor, &ops)?;
        assert_eq!(editor.live_batons(), (0, 0));
        Ok(recorder.take())
    }

    pub fn update(&self, ops: Vec<EditOp>) -> Result<Vec<Notification>> {
        let recorder = Recorder::default();
        let mut editor = self.update_editor(recorder.options())?;
        drive(&mut editor, &ops)?;
        assert_eq!(editor.live_batons(), (0, 0));
        Ok(recorder.take())
    }

    pub fn update_editor(&self, options: EditorOptions) -> Result<UpdateEditor> {
        update_editor(&self.root, 0, &self.config, options)
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn area(&self, rel: &str) -> AdmArea {
        AdmArea::new(&self.path(rel), &self.config)
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn write(&self, rel: &str, text: &str) {
        fs::write(self.path(rel), text).unwrap();
    }

    /// Local modification with an mtime that cannot match a recorded timestamp
    pub fn edit(&self, rel: &str, text: &str) {
        let path = self.path(rel);
        fs::write(&path, text).unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    }

    /// Entry `name` of the directory at `dir`
    pub fn entry(&self, dir: &str, name: &str) -> WorkingEntry {
        EntryStore::load(&self.area(dir))
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no entry '{}' in '{}'", name, dir))
    }

    pub fn has_entry(&self, dir: &str, name: &str) -> bool {
        EntryStore::load(&self.area(dir)).unwrap().contains(name)
    }

    pub fn working_props(&self, name: &str) -> PropList {
        load_props(&self.area("").props_path(name)).unwrap()
    }

    pub fn base_props(&self, name: &str) -> PropList {
        load_props(&self.area("").prop_base_path(name)).unwrap()
    }

    pub fn set_working_props(&self, name: &str, props: &[(&str, &str)]) {
        let list: PropList = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        write_props(&self.area("").props_path(name), &list).unwrap();
    }

    /// Names in the directory at `rel`, administrative area excluded
    pub fn listing(&self, rel: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path(rel))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| *n != self.config.admin_dir_name)
            .collect();
        names.sort();
        names
    }

    /// The administrative `tmp/` directory of `rel` holds nothing
    pub fn assert_clean_tmp(&self, rel: &str) {
        let tmp = self.area(rel).tmp_dir();
        let leftovers: Vec<_> = fs::read_dir(&tmp).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover tmp files in {}", tmp.display());
        assert!(!self.area(rel).has_log());
    }
}
