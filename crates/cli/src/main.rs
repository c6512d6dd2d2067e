//! wcup - working-copy update tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod util;

/// Apply tree edits to a working copy
#[derive(Parser)]
#[command(name = "wcup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: the user config file, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress to stderr (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print notifications as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a working copy of URL at PATH from an edit script
    Checkout {
        url: String,
        path: PathBuf,
        /// Edit script (JSON); `-` reads stdin
        #[arg(short, long)]
        script: PathBuf,
        /// Target revision (default: taken from the script)
        #[arg(short, long)]
        revision: Option<u64>,
    },
    /// Bring the working copy at PATH to a new revision
    Update {
        path: PathBuf,
        #[arg(short, long)]
        script: PathBuf,
        #[arg(short, long)]
        revision: Option<u64>,
    },
    /// Move the working copy at PATH to URL
    Switch {
        url: String,
        path: PathBuf,
        #[arg(short, long)]
        script: PathBuf,
        #[arg(short, long)]
        revision: Option<u64>,
    },
    /// Replay unfinished journals and release stale locks
    Cleanup { path: PathBuf },
    /// Remove conflict artifacts of PATH
    Resolved {
        path: PathBuf,
        /// Only clear the text conflict
        #[arg(long, conflicts_with = "props_only")]
        text_only: bool,
        /// Only clear the property conflict
        #[arg(long)]
        props_only: bool,
    },
    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    List,
    /// Print the user config file location
    Path,
    /// Print an example configuration file
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_tracing(cli.verbose);

    let config = util::load_config(cli.config.as_deref())?;
    let output = util::Output { json: cli.json };

    match cli.command {
        Commands::Checkout {
            url,
            path,
            script,
            revision,
        } => cmd::edit::run_checkout(&url, &path, &script, revision, &config, output),
        Commands::Update {
            path,
            script,
            revision,
        } => cmd::edit::run_update(&path, &script, revision, &config, output),
        Commands::Switch {
            url,
            path,
            script,
            revision,
        } => cmd::edit::run_switch(&url, &path, &script, revision, &config, output),
        Commands::Cleanup { path } => cmd::cleanup::run(&path, &config),
        Commands::Resolved {
            path,
            text_only,
            props_only,
        } => cmd::resolved::run(&path, text_only, props_only, &config),
        Commands::Config(command) => match command {
            ConfigCommands::List => cmd::config::run_list(&config, cli.config.as_deref()),
            ConfigCommands::Path => cmd::config::run_path(),
            ConfigCommands::Example => cmd::config::run_example(),
        },
    }
}
