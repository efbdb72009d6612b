//! Test doubles for the process and download seams.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cache::Downloader;
use crate::error::{Result, SetupError};
use crate::process::{CommandLine, CommandResult, ExecOptions, ProcessRunner};

type Hook = Box<dyn Fn(&CommandLine) + Send + Sync>;

/// Process runner that replays scripted results.
///
/// Queued responses are consumed in order; once the queue is empty every
/// call gets the fallback (exit 0 unless set with [`ScriptedRunner::always`]).
pub struct ScriptedRunner {
    queue: Mutex<VecDeque<CommandResult>>,
    fallback: CommandResult,
    calls: Mutex<Vec<(CommandLine, Instant)>>,
    hook: Option<Hook>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: CommandResult::new(0, "", ""),
            calls: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    /// Queue one response
    pub fn respond(self, result: CommandResult) -> Self {
        self.queue.lock().unwrap().push_back(result);
        self
    }

    /// Queue `times` responses with `exit_code`
    pub fn respond_n(self, exit_code: i32, times: usize) -> Self {
        {
            let mut queue = self.queue.lock().unwrap();
            for _ in 0..times {
                queue.push_back(CommandResult::new(exit_code, "", ""));
            }
        }
        self
    }

    /// Response used once the queue is drained
    pub fn always(mut self, result: CommandResult) -> Self {
        self.fallback = result;
        self
    }

    /// Side effect run on every invocation (e.g. materialize extracted files)
    pub fn on_run(mut self, hook: impl Fn(&CommandLine) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls whose arguments contain `needle`
    pub fn calls_with_arg(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.arg_values().any(|a| a == needle))
            .count()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine, options: ExecOptions) -> Result<CommandResult> {
        self.calls
            .lock()
            .unwrap()
            .push((command.clone(), Instant::now()));

        if let Some(hook) = &self.hook {
            hook(command);
        }

        let result = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if !options.ignore_return_code && !result.success() {
            return Err(SetupError::CommandFailed {
                command: command.to_string(),
                exit_code: result.exit_code,
                stderr: result.diagnostic(),
            });
        }
        Ok(result)
    }
}

/// Downloader that writes a placeholder file and records requested URLs.
pub struct FakeDownloader {
    urls: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str, temp_dir: &Path) -> Result<PathBuf> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(SetupError::Download {
                url: url.to_string(),
                message: "HTTP 404 Not Found".to_string(),
            });
        }
        std::fs::create_dir_all(temp_dir)?;
        let dest = temp_dir.join("setup.msi");
        std::fs::write(&dest, "MSI")?;
        Ok(dest)
    }
}
