//! Subprocess invocation behind a trait, so execution can be faked in tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

const STDERR_TAIL_LINES: usize = 20;

/// A shell command to run from a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Task or action name reported on failure.
    pub label: String,
    pub command: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Positional arguments appended after the command as `"$@"`.
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            args: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new("sh");
        if self.args.is_empty() {
            command.arg("-c").arg(&self.command);
        } else {
            command
                .arg("-c")
                .arg(format!("{} \"$@\"", self.command))
                .arg("kiln")
                .args(&self.args);
        }
        command.current_dir(&self.cwd).envs(&self.env);
        command
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success() -> Self {
        Self {
            status: Some(0),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Last few lines of stderr, for failure messages.
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.trim_end().lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Human readable failure description: exit status plus stderr tail.
    pub fn failure_message(&self) -> String {
        let status = match self.status {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let tail = self.stderr_tail();
        if tail.is_empty() {
            status
        } else {
            format!("{}\n{}", status, tail)
        }
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Runs `spec` to completion, capturing its output.
    ///
    /// # Errors
    ///
    /// Returns an error only if the process could not be started. A non-zero
    /// exit is reported through [`ProcessOutput::success`].
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;

    /// Starts `spec` in the background without waiting for it. Returns the pid.
    fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32>;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let output = spec
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::ActionFailed {
                action: spec.label.clone(),
                message: format!("Failed to execute '{}': {}", spec.command, e),
            })?;

        Ok(ProcessOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32> {
        let child = spec
            .to_command()
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| Error::ActionFailed {
                action: spec.label.clone(),
                message: format!("Failed to start '{}': {}", spec.command, e),
            })?;
        Ok(child.id())
    }
}
