//! GitHub Actions workflow commands.
//!
//! State is handed to later steps through the runner's command files
//! (`GITHUB_ENV`, `GITHUB_PATH`, `GITHUB_OUTPUT`) and log grouping or
//! annotations through `::command::` lines on the console. Outside Actions the
//! same calls only touch the current process and print locally.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;

use crate::error::{Result, SetupError};
use crate::provision::ProvisionedTool;

pub const OUTPUT_PATH: &str = "advinst-path";

/// Stream carrying workflow commands and local status lines.
///
/// The runner parses commands from both streams, so moving them to stderr
/// leaves stdout free for machine-readable output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Console {
    #[default]
    Stdout,
    Stderr,
}

impl Console {
    fn print(self, line: &str) {
        match self {
            Console::Stdout => println!("{}", line),
            Console::Stderr => eprintln!("{}", line),
        }
    }
}

/// Handle to the workflow runner, or to nothing when run locally.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    in_actions: bool,
    env_file: Option<PathBuf>,
    path_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    /// Mirror exports into this process's environment
    update_process_env: bool,
    console: Console,
}

impl Workflow {
    /// Detect the runner from the standard Actions environment variables.
    pub fn from_env() -> Self {
        let file_var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        Self {
            in_actions: std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true"),
            env_file: file_var("GITHUB_ENV"),
            path_file: file_var("GITHUB_PATH"),
            output_file: file_var("GITHUB_OUTPUT"),
            update_process_env: true,
            console: Console::Stdout,
        }
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn console(&self) -> Console {
        self.console
    }

    /// Runner writing its command files under `dir`. Leaves the process
    /// environment alone.
    #[cfg(test)]
    pub fn with_files(dir: &Path) -> Self {
        Self {
            in_actions: true,
            env_file: Some(dir.join("github_env")),
            path_file: Some(dir.join("github_path")),
            output_file: Some(dir.join("github_output")),
            update_process_env: false,
            console: Console::Stdout,
        }
    }

    pub fn is_actions(&self) -> bool {
        self.in_actions
    }

    pub fn group(&self, title: &str) {
        if self.in_actions {
            self.console.print(&format!("::group::{}", title));
        } else {
            self.console.print(&format!("\n  {}", style(title).cyan().bold()));
        }
    }

    pub fn end_group(&self) {
        if self.in_actions {
            self.console.print("::endgroup::");
        }
    }

    /// Ask the runner to redact `secret` from all further log output.
    pub fn mask(&self, secret: &str) {
        if self.in_actions && !secret.is_empty() {
            self.console.print(&format!("::add-mask::{}", escape_data(secret)));
        }
    }

    pub fn error(&self, message: &str) {
        if self.in_actions {
            self.console.print(&format!("::error::{}", escape_data(message)));
        }
    }

    pub fn warning(&self, message: &str) {
        if self.in_actions {
            self.console.print(&format!("::warning::{}", escape_data(message)));
        }
    }

    /// Export `name=value` to later steps and to this process.
    pub fn export_variable(&self, name: &str, value: &str) -> Result<()> {
        if self.update_process_env {
            std::env::set_var(name, value);
        }
        if let Some(file) = &self.env_file {
            append(file, &key_value_message(name, value)?)?;
        }
        tracing::debug!("Exported {}={}", name, value);
        Ok(())
    }

    /// Prepend `entry` to PATH for later steps and for this process.
    pub fn add_path(&self, entry: &str) -> Result<()> {
        if self.update_process_env {
            let current = std::env::var_os("PATH").unwrap_or_default();
            let mut paths = vec![PathBuf::from(entry)];
            paths.extend(std::env::split_paths(&current));
            let joined = std::env::join_paths(paths)
                .with_context(|| format!("cannot add '{}' to PATH", entry))?;
            std::env::set_var("PATH", joined);
        }
        if let Some(file) = &self.path_file {
            append(file, &format!("{}\n", entry))?;
        }
        tracing::debug!("Added {} to PATH", entry);
        Ok(())
    }

    pub fn set_output(&self, name: &str, value: &str) -> Result<()> {
        if let Some(file) = &self.output_file {
            append(file, &key_value_message(name, value)?)?;
        }
        Ok(())
    }

    /// Publish a provisioned tool: exported variables, PATH, step output.
    pub fn apply(&self, tool: &ProvisionedTool) -> Result<()> {
        for (name, value) in tool.exports() {
            self.export_variable(name, &value)?;
        }
        self.add_path(&tool.path_entry())?;
        self.set_output(OUTPUT_PATH, &tool.binary_path.to_string_lossy())?;

        if !self.in_actions {
            self.console.print(&format!(
                "  {} {} {}",
                style("✓").green().bold(),
                style(format!("Advanced Installer {}", tool.version)).white().bold(),
                style(tool.binary_path.display()).dim()
            ));
        }
        Ok(())
    }
}

/// `name<<delimiter` heredoc block understood by the runner's file commands.
fn key_value_message(name: &str, value: &str) -> Result<String> {
    let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
    if name.contains(&delimiter) || value.contains(&delimiter) {
        return Err(SetupError::Config(format!(
            "Unexpected input: '{}' contains the delimiter {}",
            name, delimiter
        )));
    }
    Ok(format!("{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter))
}

fn append(file: &Path, content: &str) -> Result<()> {
    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .with_context(|| format!("opening workflow file {}", file.display()))?;
    handle
        .write_all(content.as_bytes())
        .with_context(|| format!("writing workflow file {}", file.display()))?;
    Ok(())
}

/// Escape a workflow command payload.
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
