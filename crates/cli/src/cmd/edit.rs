//! Checkout, update and switch commands
//!
//! All three drive an edit script through the update editor; they differ
//! only in how the editor is set up.

use crate::util::{self, Output};
use anyhow::{Context, Result};
use editor::{drive, Editor, EditorOptions, Notification, UpdateEditor};
use owo_colors::OwoColorize;
use std::path::Path;
use wc_core::WcConfig;

fn options(output: Output) -> EditorOptions {
    EditorOptions::new().with_notify(move |n: &Notification| util::print_notification(n, output))
}

fn run_script(mut editor: UpdateEditor, script: &[editor::EditOp], output: Output) -> Result<()> {
    if let Err(e) = drive(&mut editor, script) {
        // Journals already written stay behind for cleanup
        let _ = editor.abort_edit();
        return Err(e).context("Edit failed; run 'wcup cleanup' before retrying");
    }
    if !output.json {
        println!(
            "{} {}",
            "At revision".dimmed(),
            editor.target_revision().to_string().bold()
        );
    }
    Ok(())
}

pub fn run_checkout(
    url: &str,
    path: &Path,
    script: &Path,
    revision: Option<u64>,
    config: &WcConfig,
    output: Output,
) -> Result<()> {
    let ops = util::load_script(script)?;
    let revision = util::target_revision(revision, &ops)?;
    let editor = editor::checkout_editor(path, url, revision, config, options(output))
        .with_context(|| format!("Cannot check out into {}", path.display()))?;
    run_script(editor, &ops, output)
}

pub fn run_update(
    path: &Path,
    script: &Path,
    revision: Option<u64>,
    config: &WcConfig,
    output: Output,
) -> Result<()> {
    let ops = util::load_script(script)?;
    let revision = util::target_revision(revision, &ops)?;
    let editor = editor::update_editor(path, revision, config, options(output))
        .with_context(|| format!("Cannot update {}", path.display()))?;
    run_script(editor, &ops, output)
}

pub fn run_switch(
    url: &str,
    path: &Path,
    script: &Path,
    revision: Option<u64>,
    config: &WcConfig,
    output: Output,
) -> Result<()> {
    let ops = util::load_script(script)?;
    let revision = util::target_revision(revision, &ops)?;
    let editor = editor::switch_editor(path, url, revision, config, options(output))
        .with_context(|| format!("Cannot switch {}", path.display()))?;
    run_script(editor, &ops, output)
}
