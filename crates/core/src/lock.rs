//! Per-directory administrative lock
//!
//! Presence of `<adm>/lock` means the directory is held. The file records the
//! holder's PID so recovery can tell a crashed session from a live one.

use crate::adm::{now_micros, AdmArea};
use crate::error::{IoResultExt, Result, WcError};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Held administrative lock; released on drop
#[derive(Debug)]
pub struct AdminLock {
    path: PathBuf,
    released: bool,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    acquired_at: i64,
}

impl AdminLock {
    /// Acquire the lock, failing with `Locked` if anyone holds it
    pub fn acquire(area: &AdmArea) -> Result<Self> {
        let path = area.lock_path();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(WcError::Locked {
                    path: area.dir().to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WcError::NotWorkingCopy {
                    path: area.dir().to_path_buf(),
                })
            }
            Err(e) => return Err(WcError::io(&path, e)),
        };

        let content = LockContent {
            pid: std::process::id(),
            acquired_at: now_micros(),
        };
        let serialized = serde_json::to_vec(&content)?;
        file.write_all(&serialized).at(&path)?;
        file.sync_all().at(&path)?;

        debug!("Locked {}", area.dir().display());
        Ok(Self {
            path,
            released: false,
        })
    }

    /// Release the lock explicitly, surfacing removal errors
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        std::fs::remove_file(&self.path).at(&self.path)
    }

    /// Whether a lock marker is present
    pub fn is_locked(area: &AdmArea) -> bool {
        area.lock_path().exists()
    }

    /// Remove a lock left behind by a process that no longer exists
    ///
    /// Returns `true` if a stale lock was removed, `false` if there was no
    /// lock. A lock held by a live process is reported as `Locked`.
    pub fn break_stale(area: &AdmArea) -> Result<bool> {
        let path = area.lock_path();
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(WcError::io(&path, e)),
        };

        let stale = match serde_json::from_slice::<LockContent>(&data) {
            Ok(content) => !is_process_alive(content.pid),
            // Unreadable lock content means the writer died mid-write
            Err(_) => true,
        };

        if !stale {
            return Err(WcError::Locked {
                path: area.dir().to_path_buf(),
            });
        }

        warn!("Removing stale lock on {}", area.dir().display());
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WcError::io(&path, e)),
        }
    }
}

impl Drop for AdminLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Check if process is alive
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Null signal: existence check only
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    // Conservative: assume process is alive on unknown platforms
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WcConfig;

    fn area() -> (tempfile::TempDir, AdmArea) {
        let temp_dir = tempfile::tempdir().unwrap();
        let area = AdmArea::create(temp_dir.path(), &WcConfig::default()).unwrap();
        (temp_dir, area)
    }

    #[test]
    fn test_lock_acquisition() {
        let (_tmp, area) = area();

        let lock1 = AdminLock::acquire(&area).unwrap();
        assert!(AdminLock::is_locked(&area));

        let lock2 = AdminLock::acquire(&area);
        assert!(matches!(lock2, Err(WcError::Locked { .. })));

        drop(lock1);
        assert!(!AdminLock::is_locked(&area));

        let lock3 = AdminLock::acquire(&area).unwrap();
        lock3.release().unwrap();
        assert!(!AdminLock::is_locked(&area));
    }

    #[test]
    fn test_break_stale_lock() {
        let (_tmp, area) = area();
        // PID 999999 is unlikely to exist
        std::fs::write(area.lock_path(), br#"{"pid":999999,"acquired_at":0}"#).unwrap();

        assert!(AdminLock::break_stale(&area).unwrap());
        assert!(!AdminLock::is_locked(&area));
        assert!(!AdminLock::break_stale(&area).unwrap());
    }

    #[test]
    fn test_live_lock_is_not_broken() {
        let (_tmp, area) = area();
        let _lock = AdminLock::acquire(&area).unwrap();
        assert!(matches!(
            AdminLock::break_stale(&area),
            Err(WcError::Locked { .. })
        ));
        assert!(AdminLock::is_locked(&area));
    }

    #[test]
    fn test_garbage_lock_is_stale() {
        let (_tmp, area) = area();
        std::fs::write(area.lock_path(), b"").unwrap();
        assert!(AdminLock::break_stale(&area).unwrap());
    }

    #[test]
    fn test_process_alive_current() {
        assert!(is_process_alive(std::process::id()));
    }
}
