//! Administrative area layout
//!
//! Every versioned directory carries a reserved subdirectory:
//! ```text
//! <dir>/.wc/
//!   entries            one record per child name ("" = this directory)
//!   text-base/
//!     <name>.base      pristine text of each versioned file
//!   prop-base/
//!     <name>.props     pristine properties of each versioned file
//!   props/
//!     <name>.props     working properties of each versioned file
//!   dir-prop-base      pristine properties of this directory
//!   dir-props          working properties of this directory
//!   lock               present while a session holds the directory
//!   log                present while journaled work is pending
//!   tmp/               staging area for journaled moves
//! ```

use crate::config::WcConfig;
use crate::error::{IoResultExt, Result, WcError};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use ulid::Ulid;

const ENTRIES_FILE: &str = "entries";
const LOCK_FILE: &str = "lock";
const LOG_FILE: &str = "log";
const TMP_DIR: &str = "tmp";
const TEXT_BASE_DIR: &str = "text-base";
const PROP_BASE_DIR: &str = "prop-base";
const PROPS_DIR: &str = "props";
const DIR_PROP_BASE_FILE: &str = "dir-prop-base";
const DIR_PROPS_FILE: &str = "dir-props";

/// Paths of one directory's administrative area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmArea {
    dir: PathBuf,
    adm: PathBuf,
}

impl AdmArea {
    pub fn new(dir: &Path, config: &WcConfig) -> Self {
        Self {
            dir: dir.to_path_buf(),
            adm: dir.join(&config.admin_dir_name),
        }
    }

    /// Open an existing administrative area
    pub fn open(dir: &Path, config: &WcConfig) -> Result<Self> {
        let area = Self::new(dir, config);
        if !area.exists() {
            return Err(WcError::NotWorkingCopy {
                path: dir.to_path_buf(),
            });
        }
        Ok(area)
    }

    /// Create the directory skeleton (idempotent)
    pub fn create(dir: &Path, config: &WcConfig) -> Result<Self> {
        let area = Self::new(dir, config);
        for sub in [TMP_DIR, TEXT_BASE_DIR, PROP_BASE_DIR, PROPS_DIR] {
            let path = area.adm.join(sub);
            fs::create_dir_all(&path).at(&path)?;
        }
        Ok(area)
    }

    pub fn exists(&self) -> bool {
        self.adm.is_dir() && self.entries_path().is_file()
    }

    /// The versioned directory itself
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The administrative subdirectory
    pub fn adm_dir(&self) -> &Path {
        &self.adm
    }

    pub fn entries_path(&self) -> PathBuf {
        self.adm.join(ENTRIES_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.adm.join(LOCK_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.adm.join(LOG_FILE)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.adm.join(TMP_DIR)
    }

    pub fn has_log(&self) -> bool {
        self.log_path().exists()
    }

    /// Working file of a child
    pub fn working_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn text_base_path(&self, name: &str) -> PathBuf {
        self.adm.join(TEXT_BASE_DIR).join(format!("{}.base", name))
    }

    /// Pristine properties; `""` names the directory itself
    pub fn prop_base_path(&self, name: &str) -> PathBuf {
        if name.is_empty() {
            self.adm.join(DIR_PROP_BASE_FILE)
        } else {
            self.adm.join(PROP_BASE_DIR).join(format!("{}.props", name))
        }
    }

    /// Working properties; `""` names the directory itself
    pub fn props_path(&self, name: &str) -> PathBuf {
        if name.is_empty() {
            self.adm.join(DIR_PROPS_FILE)
        } else {
            self.adm.join(PROPS_DIR).join(format!("{}.props", name))
        }
    }

    /// Fresh, unused path inside `tmp/`
    pub fn tmp_path(&self, stem: &str) -> PathBuf {
        self.tmp_dir().join(format!("{}.{}.tmp", stem, Ulid::new()))
    }

    /// Express a path inside this directory relative to it, for journal steps
    pub fn relative<'a>(&self, path: &'a Path) -> Result<&'a Path> {
        path.strip_prefix(&self.dir).map_err(|_| {
            WcError::ProtocolViolation(format!(
                "'{}' is outside '{}'",
                path.display(),
                self.dir.display()
            ))
        })
    }

    /// Resolve a journal-relative path
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.dir.join(relative)
    }
}

/// Check whether `name` is usable as a single entry name
pub fn is_valid_entry_name(name: &str, config: &WcConfig) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name != config.admin_dir_name
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Atomic write helper
///
/// Writes data to a temporary file, fsyncs it, then renames it to the target path.
pub fn atomic_write(tmp_dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    fs::create_dir_all(tmp_dir).at(tmp_dir)?;
    let tmp = tmp_dir.join(format!("atomic.{}.tmp", Ulid::new()));
    {
        let mut file = File::create(&tmp).at(&tmp)?;
        file.write_all(data).at(&tmp)?;
        file.sync_all().at(&tmp)?;
    }
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(WcError::io(target, e));
    }
    if let Some(parent) = target.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Fsync a directory so renames inside it are durable
pub fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let handle = OpenOptions::new().read(true).open(dir).at(dir)?;
        handle.sync_all().at(dir)?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

/// Modification time in microseconds since the epoch, `None` if missing
pub fn mtime_micros(path: &Path) -> Result<Option<i64>> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(WcError::io(path, e)),
    };
    let modified = metadata.modified().at(path)?;
    let micros = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_micros() as i64,
        Err(e) => -(e.duration().as_micros() as i64),
    };
    Ok(Some(micros))
}

/// Current time in microseconds since the epoch
pub fn now_micros() -> i64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Pick `<base><suffix>`, or `<base>.<n><suffix>` if taken, that does not exist yet
pub fn unique_path(dir: &Path, base: &str, suffix: &str) -> PathBuf {
    let first = dir.join(format!("{}{}", base, suffix));
    if !first.exists() {
        return first;
    }
    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{}.{}{}", base, n, suffix));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let config = WcConfig::default();
        let area = AdmArea::new(Path::new("/wc/sub"), &config);
        assert_eq!(area.entries_path(), Path::new("/wc/sub/.wc/entries"));
        assert_eq!(
            area.text_base_path("a.txt"),
            Path::new("/wc/sub/.wc/text-base/a.txt.base")
        );
        assert_eq!(area.props_path(""), Path::new("/wc/sub/.wc/dir-props"));
        assert_eq!(
            area.prop_base_path("a.txt"),
            Path::new("/wc/sub/.wc/prop-base/a.txt.props")
        );
    }

    #[test]
    fn test_open_requires_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = WcConfig::default();
        let err = AdmArea::open(temp_dir.path(), &config).unwrap_err();
        assert!(matches!(err, WcError::NotWorkingCopy { .. }));

        let area = AdmArea::create(temp_dir.path(), &config).unwrap();
        assert!(area.tmp_dir().is_dir());
        assert!(!area.exists());
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tmp = temp_dir.path().join("tmp");
        let target = temp_dir.path().join("target.txt");

        atomic_write(&tmp, &target, b"first").unwrap();
        atomic_write(&tmp, &target, b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        assert_eq!(fs::read_dir(&tmp).unwrap().count(), 0);
    }

    #[test]
    fn test_entry_names() {
        let config = WcConfig::default();
        assert!(is_valid_entry_name("file.txt", &config));
        assert!(!is_valid_entry_name("", &config));
        assert!(!is_valid_entry_name("..", &config));
        assert!(!is_valid_entry_name(".wc", &config));
        assert!(!is_valid_entry_name("a/b", &config));
    }

    #[test]
    fn test_unique_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = unique_path(temp_dir.path(), "f.txt", ".prej");
        assert_eq!(first, temp_dir.path().join("f.txt.prej"));
        fs::write(&first, b"x").unwrap();
        let second = unique_path(temp_dir.path(), "f.txt", ".prej");
        assert_eq!(second, temp_dir.path().join("f.txt.2.prej"));
    }

    #[test]
    fn test_mtime_missing_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(mtime_micros(&temp_dir.path().join("missing")).unwrap(), None);
        let file = temp_dir.path().join("present");
        fs::write(&file, b"x").unwrap();
        assert!(mtime_micros(&file).unwrap().is_some());
    }
}
