//! Configuration command
//!
//! Shows the effective configuration and where it comes from.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use wc_core::config::{config_file_path, example_config};
use wc_core::WcConfig;

fn show(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("\"{}\"", value),
        None => "(default)".dimmed().to_string(),
    }
}

/// List all configuration values
pub fn run_list(config: &WcConfig, explicit: Option<&Path>) -> Result<()> {
    let location = explicit.map(Path::to_path_buf).or_else(config_file_path);

    println!("{}", "Configuration".bold());
    if let Some(location) = location {
        let note = if location.exists() { "" } else { " (not present, using defaults)" };
        println!("{}: {}{}\n", "Location".dimmed(), location.display().dimmed(), note.dimmed());
    }

    println!("  {} = \"{}\"", "admin_dir_name".cyan(), config.admin_dir_name);

    println!("\n{}", "[merge]".yellow());
    let diff3 = config.merge.diff3_cmd.as_ref().map(|p| p.display().to_string());
    println!(
        "  {} = {}",
        "diff3_cmd".cyan(),
        match diff3 {
            Some(cmd) => format!("\"{}\"", cmd),
            None => "(built-in merge)".dimmed().to_string(),
        }
    );
    println!("  {} = {:?}", "diff3_args".cyan(), config.merge.diff3_args);
    println!("  {} = {}", "show_base".cyan(), config.merge.show_base);

    println!("\n{}", "[merge.labels]".yellow());
    println!("  {} = {}", "mine".cyan(), show(config.merge.labels.mine.as_deref()));
    println!("  {} = {}", "older".cyan(), show(config.merge.labels.older.as_deref()));
    println!("  {} = {}", "theirs".cyan(), show(config.merge.labels.theirs.as_deref()));

    println!("\n{}", "[locks]".yellow());
    println!("  {} = {}", "break_stale".cyan(), config.locks.break_stale);
    Ok(())
}

/// Show the config file path
pub fn run_path() -> Result<()> {
    let path = config_file_path().context("Could not determine config file path")?;
    println!("{}", path.display());
    if !path.exists() {
        println!(
            "{}",
            "File does not exist. Use 'wcup config example' for a starting point.".yellow()
        );
    }
    Ok(())
}

/// Show example configuration
pub fn run_example() -> Result<()> {
    println!("{}", example_config());
    Ok(())
}
