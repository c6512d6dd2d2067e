//! Resolved command - clear conflict state after a manual merge

use anyhow::{Context, Result};
use editor::{resolved, ResolveWhat};
use owo_colors::OwoColorize;
use std::path::Path;
use wc_core::WcConfig;

pub fn run(path: &Path, text_only: bool, props_only: bool, config: &WcConfig) -> Result<()> {
    let what = ResolveWhat {
        text: !props_only,
        props: !text_only,
    };
    let cleared = resolved(path, what, config)
        .with_context(|| format!("Cannot resolve {}", path.display()))?;

    if cleared {
        println!("{} Resolved conflicted state of '{}'", "✓".green(), path.display());
    } else {
        println!("{}", format!("'{}' is not in conflict", path.display()).dimmed());
    }
    Ok(())
}
