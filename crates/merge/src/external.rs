//! External diff3 helper invocation
//!
//! GNU diff3 conventions: `diff3 -E -m -L mine -L older -L yours MINE OLDER YOURS`
//! prints the merged text on stdout and exits 0 (clean), 1 (conflicts) or
//! 2 (trouble).

use crate::conflicts::ConflictLabels;
use crate::diff3::MergeOutcome;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use wc_core::config::MergeConfig;
use wc_core::{IoResultExt, Result, WcError};

/// Exit status meaning "merged, with conflicts"
pub const DIFF3_CONFLICT_EXIT: i32 = 1;

/// A ready-to-run helper command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff3Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Diff3Command {
    /// Run the helper in `dir` with its stdout captured in `output`
    ///
    /// Exit 0 is a clean merge and exit 1 a merge with conflict markers;
    /// any other status, or a helper that cannot be spawned, is an error.
    pub fn run(&self, dir: &Path, output: &Path) -> Result<MergeOutcome> {
        let file = File::create(output).at(output)?;
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .status()
            .map_err(|e| WcError::ExternalProgramMissing {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        debug!("{} exited with {:?}", self.program, status.code());
        match status.code() {
            Some(0) => Ok(MergeOutcome::Merged),
            Some(DIFF3_CONFLICT_EXIT) => Ok(MergeOutcome::Conflicted),
            Some(code) => Err(WcError::ExternalProgramFailed {
                program: self.program.clone(),
                status: code,
            }),
            None => {
                warn!("{} terminated by a signal", self.program);
                Err(WcError::ExternalProgramFailed {
                    program: self.program.clone(),
                    status: -1,
                })
            }
        }
    }
}

/// Build the helper command line, or `None` when no helper is configured
///
/// Paths are passed as given; callers hand in paths relative to the
/// directory the helper runs in.
pub fn diff3_command(
    config: &MergeConfig,
    labels: &ConflictLabels,
    mine: &Path,
    older: &Path,
    yours: &Path,
) -> Option<Diff3Command> {
    let program = config.diff3_cmd.as_ref()?;
    let mut args = config.diff3_args.clone();
    args.push(if config.show_base { "-A" } else { "-E" }.to_string());
    args.push("-m".to_string());
    for label in [&labels.mine, &labels.older, &labels.theirs] {
        args.push("-L".to_string());
        args.push(label.clone());
    }
    for path in [mine, older, yours] {
        args.push(path.to_string_lossy().into_owned());
    }
    Some(Diff3Command {
        program: program.to_string_lossy().into_owned(),
        args,
    })
}
