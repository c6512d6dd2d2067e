//! Cleanup command - finish interrupted operations

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use wc_core::WcConfig;

pub fn run(path: &Path, config: &WcConfig) -> Result<()> {
    let report = journal::cleanup(path, config)
        .with_context(|| format!("Cleanup of {} failed", path.display()))?;

    println!("{} Cleaned up {}", "✓".green(), path.display());
    println!(
        "  {} directories, {} journals replayed, {} stale locks broken, {} temporary files removed",
        report.directories,
        report.journals_replayed,
        report.stale_locks_broken,
        report.tmp_files_removed
    );
    Ok(())
}
