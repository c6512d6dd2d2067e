//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use editor::{EditOp, Notification, NotifyAction};
use merge::ChangeState;
use owo_colors::OwoColorize;
use std::io::Read;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use wc_core::config::config_file_path;
use wc_core::WcConfig;

/// How notifications are printed
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

/// Log to stderr; `RUST_LOG` overrides the verbosity flag
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the configuration from `path`, or the user config file, or defaults
pub fn load_config(path: Option<&Path>) -> Result<WcConfig> {
    let config = match path {
        Some(path) => WcConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match config_file_path() {
            Some(path) => WcConfig::load_or_default(&path)?,
            None => WcConfig::default(),
        },
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Read and parse an edit script; `-` reads stdin
pub fn load_script(path: &Path) -> Result<Vec<EditOp>> {
    let json = if path == Path::new("-") {
        let mut json = String::new();
        std::io::stdin()
            .read_to_string(&mut json)
            .context("Failed to read edit script from stdin")?;
        json
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read edit script {}", path.display()))?
    };
    editor::parse_script(&json).context("Invalid edit script")
}

/// Target revision: the explicit one, else the script's first `set_target_revision`
pub fn target_revision(explicit: Option<u64>, ops: &[EditOp]) -> Result<u64> {
    if let Some(revision) = explicit {
        return Ok(revision);
    }
    ops.iter()
        .find_map(|op| match op {
            EditOp::SetTargetRevision { revision } => Some(*revision),
            _ => None,
        })
        .context("Edit script does not set a target revision; pass --revision")
}

fn state_char(state: ChangeState) -> char {
    match state {
        ChangeState::Changed => 'U',
        ChangeState::Merged => 'G',
        ChangeState::Conflicted => 'C',
        ChangeState::Inapplicable | ChangeState::Unchanged => ' ',
    }
}

/// Two-column status code: text, then properties
pub fn status_code(n: &Notification) -> String {
    let text = match n.action {
        NotifyAction::Added => 'A',
        NotifyAction::Deleted => 'D',
        _ => state_char(n.content_state),
    };
    format!("{}{}", text, state_char(n.prop_state))
}

/// Print one notification
pub fn print_notification(n: &Notification, output: Output) {
    if output.json {
        match serde_json::to_string(n) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Unprintable notification: {}", e),
        }
        return;
    }

    let code = status_code(n);
    let path = n.path.display();
    match n.action {
        NotifyAction::Added => println!("{}  {}", code.green(), path),
        NotifyAction::Deleted => println!("{}  {}", code.red(), path),
        NotifyAction::Conflicted => println!("{}  {}", code.yellow().bold(), path),
        NotifyAction::Merged => println!("{}  {}", code.cyan(), path),
        NotifyAction::Updated => println!("{}  {}", code, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wc_core::NodeKind;

    fn notification(action: NotifyAction, content: ChangeState, props: ChangeState) -> Notification {
        Notification {
            path: PathBuf::from("f"),
            action,
            kind: NodeKind::File,
            content_state: content,
            prop_state: props,
            revision: Some(2),
        }
    }

    #[test]
    fn test_status_codes() {
        use ChangeState::*;
        let n = notification(NotifyAction::Added, Changed, Inapplicable);
        assert_eq!(status_code(&n), "A ");
        let n = notification(NotifyAction::Conflicted, Merged, Conflicted);
        assert_eq!(status_code(&n), "GC");
        let n = notification(NotifyAction::Updated, Inapplicable, Changed);
        assert_eq!(status_code(&n), " U");
    }

    #[test]
    fn test_target_revision() {
        let ops = vec![EditOp::SetTargetRevision { revision: 9 }];
        assert_eq!(target_revision(None, &ops).unwrap(), 9);
        assert_eq!(target_revision(Some(3), &ops).unwrap(), 3);
        assert!(target_revision(None, &[]).is_err());
    }
}
