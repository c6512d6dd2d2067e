//! Marking conflicts resolved

use journal::{recover_dir, Journal};
use merge::has_conflict_markers;
use std::path::Path;
use tracing::{info, warn};
use wc_core::{AdmArea, AdminLock, EntryAttr, EntryStore, Result, WcConfig, WcError, THIS_DIR};

/// Which conflict artifacts to clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveWhat {
    pub text: bool,
    pub props: bool,
}

impl Default for ResolveWhat {
    fn default() -> Self {
        Self {
            text: true,
            props: true,
        }
    }
}

/// Remove conflict artifacts of `path` and clear its conflict fields
///
/// Returns `false` when there was nothing to resolve.
pub fn resolved(path: &Path, what: ResolveWhat, config: &WcConfig) -> Result<bool> {
    let (area, name) = locate(path, config)?;
    recover_dir(&area)?;

    let entries = EntryStore::load(&area)?;
    let entry = entries.get(&name).ok_or_else(|| WcError::EntryNotFound {
        path: path.to_path_buf(),
    })?;

    let text_artifacts: Vec<String> = if what.text {
        [&entry.conflict_old, &entry.conflict_new, &entry.conflict_wrk]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    let reject = if what.props {
        entry.prop_reject_file.clone()
    } else {
        None
    };
    if text_artifacts.is_empty() && reject.is_none() {
        return Ok(false);
    }

    if what.text && !text_artifacts.is_empty() {
        let working = area.working_path(&name);
        if let Ok(content) = std::fs::read(&working) {
            if has_conflict_markers(&content) {
                warn!("{} still contains conflict markers", working.display());
            }
        }
    }

    let lock = AdminLock::acquire(&area)?;
    let mut journal = Journal::new(&area);
    for artifact in &text_artifacts {
        journal.remove(&area.working_path(artifact))?;
    }
    if !text_artifacts.is_empty() {
        journal.modify(&name, EntryAttr::ConflictOld(None));
        journal.modify(&name, EntryAttr::ConflictNew(None));
        journal.modify(&name, EntryAttr::ConflictWrk(None));
    }
    if let Some(reject) = &reject {
        journal.remove(&area.working_path(reject))?;
        journal.modify(&name, EntryAttr::PropRejectFile(None));
    }
    journal.run()?;
    lock.release()?;

    info!("Resolved conflicted state of {}", path.display());
    Ok(true)
}

/// Administrative area and entry name describing `path`
fn locate(path: &Path, config: &WcConfig) -> Result<(AdmArea, String)> {
    let own = AdmArea::new(path, config);
    if own.exists() {
        return Ok((own, THIS_DIR.to_string()));
    }
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| WcError::NotWorkingCopy {
            path: path.to_path_buf(),
        })?;
    Ok((AdmArea::open(parent, config)?, name))
}
