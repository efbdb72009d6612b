//! License registration.
//!
//! Two mutually exclusive paths:
//!
//! - **Fixed**: one `/RegisterCI <key>` call. A rejected key is fatal
//!   immediately; waiting will not make it valid.
//! - **Floating**: poll the license server for a free seat until one is
//!   granted or the acquisition deadline passes.
//!
//! The polling loop is strictly sequential (check deadline, attempt, sleep)
//! and measures time with tokio's monotonic clock, so tests drive it with a
//! paused runtime instead of real sleeps.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ToolSpec;
use crate::error::{Result, SetupError};
use crate::process::{CommandLine, ExecOptions, ProcessRunner};
use crate::utils::{format_duration, format_exit_code};

/// Exit code meaning "no seat available right now, or a transient server
/// error". Reported by the tool as the HRESULT `0xE001006D`.
pub const NO_SEAT_EXIT_CODE: i32 = 0xE001_006D_u32 as i32;

/// Pause between floating seat requests.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(15);

/// How a floating acquisition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseOutcome {
    /// A seat was granted.
    Acquired,
    /// Deadline passed while the server kept reporting no free seat.
    TimedOut(i32),
    /// Deadline passed and the last attempt failed with an unrecognized code.
    UnexpectedExitCode(i32),
}

/// Classification of a single floating seat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Acquired,
    NoSeat,
    Unexpected(i32),
}

impl Attempt {
    fn classify(exit_code: i32) -> Self {
        match exit_code {
            0 => Self::Acquired,
            NO_SEAT_EXIT_CODE => Self::NoSeat,
            other => Self::Unexpected(other),
        }
    }
}

pub fn register_command(binary: &Path, license_key: &str) -> CommandLine {
    CommandLine::new(binary.to_string_lossy())
        .arg("/RegisterCI")
        .secret_arg(license_key)
}

pub fn floating_command(binary: &Path, host: &str, port: u16) -> CommandLine {
    CommandLine::new(binary.to_string_lossy())
        .arg("/registerfloating")
        .arg(format!("{}:{}", host, port))
        .arg("-testconnection")
}

/// Registers fixed licenses and acquires floating seats.
pub struct LicenseAcquirer {
    runner: Arc<dyn ProcessRunner>,
    retry_interval: Duration,
}

impl LicenseAcquirer {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Register a fixed license key. A non-zero exit is fatal.
    pub async fn register(&self, binary: &Path, license_key: &str) -> Result<()> {
        tracing::info!("Registering advinst tool");

        let cmd = register_command(binary, license_key);
        let result = self.runner.run(&cmd, ExecOptions::default()).await?;
        if !result.success() {
            return Err(SetupError::RegistrationFailed(result.stdout));
        }
        Ok(())
    }

    /// Acquire a floating seat as configured by `spec`.
    ///
    /// A no-op (with a warning) when floating licensing is not enabled.
    pub async fn register_floating(&self, binary: &Path, spec: &ToolSpec) -> Result<()> {
        if !spec.floating_license {
            tracing::warn!("Floating license acquisition requested but floating licensing is not enabled; skipping");
            return Ok(());
        }

        let timeout = spec.acquisition_timeout();
        let started = Instant::now();
        let outcome = self
            .acquire_floating(binary, &spec.license_host, spec.license_port, timeout)
            .await?;

        match outcome {
            LicenseOutcome::Acquired => Ok(()),
            LicenseOutcome::TimedOut(last_exit_code) => Err(SetupError::LicenseTimedOut {
                last_exit_code,
                elapsed: started.elapsed(),
            }),
            LicenseOutcome::UnexpectedExitCode(exit_code) => {
                Err(SetupError::FloatingLicenseFailed {
                    exit_code,
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    /// Poll `host:port` for a seat until granted or `timeout` elapses.
    ///
    /// The deadline is checked before every retry; an attempt already
    /// started always runs to completion.
    pub async fn acquire_floating(
        &self,
        binary: &Path,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<LicenseOutcome> {
        tracing::info!("Acquiring floating license from {}:{}", host, port);

        let cmd = floating_command(binary, host, port);
        let deadline = Instant::now() + timeout;
        let mut attempts: u32 = 1;
        let mut exit_code = self.runner.run(&cmd, ExecOptions::default()).await?.exit_code;

        loop {
            let attempt = Attempt::classify(exit_code);
            if attempt == Attempt::Acquired {
                break;
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    "No floating license seat acquired within {} ({} attempt(s))",
                    format_duration(timeout.as_secs()),
                    attempts
                );
                return Ok(match attempt {
                    Attempt::Unexpected(code) => LicenseOutcome::UnexpectedExitCode(code),
                    _ => LicenseOutcome::TimedOut(exit_code),
                });
            }

            match attempt {
                Attempt::NoSeat => tracing::info!(
                    "No floating license seat available (exit code {}), retrying in {}",
                    format_exit_code(exit_code),
                    format_duration(self.retry_interval.as_secs())
                ),
                Attempt::Unexpected(code) => tracing::warn!(
                    "Unexpected exit code {} while acquiring floating license, retrying in {}",
                    format_exit_code(code),
                    format_duration(self.retry_interval.as_secs())
                ),
                Attempt::Acquired => {}
            }

            tokio::time::sleep(self.retry_interval).await;
            attempts += 1;
            // Only the first attempt echoes tool output
            exit_code = self
                .runner
                .run(&cmd, ExecOptions::default().silent())
                .await?
                .exit_code;
        }

        tracing::info!("Floating license acquired after {} attempt(s)", attempts);
        Ok(LicenseOutcome::Acquired)
    }
}
