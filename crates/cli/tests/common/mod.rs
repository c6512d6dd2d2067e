//! Common utilities for CLI integration tests

#![allow(dead_code)]

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Builder for one `wcup` invocation
pub struct WcupCommand {
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    stdin_data: Option<String>,
}

impl WcupCommand {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            stdin_data: None,
        }
    }

    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn stdin(&mut self, data: &str) -> &mut Self {
        self.stdin_data = Some(data.to_string());
        self
    }

    pub fn execute(&self) -> Result<CommandResult> {
        let mut command = Command::new(env!("CARGO_BIN_EXE_wcup"));
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            // Keep the user's config file out of the tests
            .env("XDG_CONFIG_HOME", &self.working_dir)
            .env("HOME", &self.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output: Output = match &self.stdin_data {
            Some(data) => {
                let mut child = command
                    .stdin(Stdio::piped())
                    .spawn()
                    .context("Failed to spawn wcup")?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(data.as_bytes())?;
                }
                child.wait_with_output().context("Failed to wait for wcup")?
            }
            None => command.output().context("Failed to run wcup")?,
        };

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }
        Ok(result)
    }

    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Usage: `wcup!(dir, "cleanup", "wc").assert_success()?;`
#[macro_export]
macro_rules! wcup {
    ($dir:expr, $($arg:expr),*) => {{
        let mut cmd = $crate::common::WcupCommand::new($dir);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}
