//! External process execution.
//!
//! Every tool interaction (msiexec extraction, license registration, COM
//! registration, floating seat checks) goes through [`ProcessRunner`]. A
//! non-zero exit is data, not an error: callers branch on specific exit
//! codes, including expected non-zero ones.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;

use crate::error::{Result, SetupError};
use crate::utils::{format_exit_code, truncate};

/// A single command-line argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub value: String,
    /// Secret arguments (license keys) are rendered as `***` in logs.
    pub secret: bool,
}

/// A program plus its arguments, in order.
///
/// Arguments are passed to the OS verbatim; any quoting the target program
/// expects (msiexec's `TARGETDIR="..."`) must already be part of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: false,
        });
        self
    }

    /// Append an argument that must never appear in logs
    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            secret: true,
        });
        self
    }

    /// Argument values, secrets included. Only for handing to the OS.
    pub fn arg_values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.value.as_str())
    }

    #[cfg(test)]
    pub fn has_secrets(&self) -> bool {
        self.args.iter().any(|a| a.secret)
    }
}

/// Renders the redacted command line.
impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.program.contains(' ') {
            write!(f, "\"{}\"", self.program)?;
        } else {
            write!(f, "{}", self.program)?;
        }
        for arg in &self.args {
            if arg.secret {
                write!(f, " ***")?;
            } else {
                write!(f, " {}", arg.value)?;
            }
        }
        Ok(())
    }
}

/// Options for a single command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Return non-zero exits as a [`CommandResult`] instead of failing.
    pub ignore_return_code: bool,

    /// Do not echo captured output to the log.
    pub silent: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            ignore_return_code: true,
            silent: false,
        }
    }
}

impl ExecOptions {
    /// Fail with [`SetupError::CommandFailed`] on non-zero exit.
    #[cfg(test)]
    pub fn checked() -> Self {
        Self {
            ignore_return_code: false,
            ..Self::default()
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Output of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best diagnostic text for error messages: stdout, then stderr.
    ///
    /// Advanced Installer and msiexec report failures on stdout.
    pub fn diagnostic(&self) -> String {
        let stdout = self.stdout.trim();
        if stdout.is_empty() {
            self.stderr.trim().to_string()
        } else {
            stdout.to_string()
        }
    }
}

/// Executes external commands.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion and capture its output.
    ///
    /// Errors only when the process cannot be started, or when
    /// `options.ignore_return_code` is false and the exit code is non-zero.
    async fn run(&self, command: &CommandLine, options: ExecOptions) -> Result<CommandResult>;
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    /// Resolve bare program names through PATH so a missing tool is
    /// reported as such instead of as a generic spawn error.
    fn resolve_program(program: &str) -> Result<std::path::PathBuf> {
        let path = std::path::Path::new(program);
        if path.components().count() > 1 || path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        which::which(program).map_err(|_| SetupError::CommandNotFound(program.to_string()))
    }

    fn build(command: &CommandLine) -> Result<tokio::process::Command> {
        let program = Self::resolve_program(&command.program)?;
        let mut cmd = std::process::Command::new(program);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            for value in command.arg_values() {
                cmd.raw_arg(value);
            }
        }

        #[cfg(not(windows))]
        cmd.args(command.arg_values());

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, command: &CommandLine, options: ExecOptions) -> Result<CommandResult> {
        tracing::info!("[command]{}", command);

        let output = Self::build(command)?
            .output()
            .await
            .map_err(|source| SetupError::CommandSpawn {
                command: command.to_string(),
                source,
            })?;

        // Killed by a signal on unix; no code to report
        let exit_code = output.status.code().unwrap_or(-1);
        let result = CommandResult::new(
            exit_code,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );

        if !options.silent {
            for line in result.stdout.lines() {
                tracing::info!("{}", line);
            }
            for line in result.stderr.lines() {
                tracing::warn!("{}", line);
            }
        }

        tracing::debug!(
            "`{}` exited with {}",
            truncate(&command.to_string(), 120),
            format_exit_code(exit_code)
        );

        if !options.ignore_return_code && !result.success() {
            return Err(SetupError::CommandFailed {
                command: command.to_string(),
                exit_code,
                stderr: result.diagnostic(),
            });
        }

        Ok(result)
    }
}
