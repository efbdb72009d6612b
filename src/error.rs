use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::utils::format_exit_code;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("This action is only supported on Windows platforms (current platform: {0})")]
    PlatformUnsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The download source answered with a non-retryable status, or kept
    /// failing after every retry.
    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("Failed to extract Advanced Installer: {0}")]
    ExtractionFailed(String),

    #[error("Expected to find {}, but it was not found.", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("Failed to register Advanced Installer license: {0}")]
    RegistrationFailed(String),

    #[error("Failed to enable the Advanced Installer COM interface: {0}")]
    ComRegistrationFailed(String),

    #[error(
        "Timed out after {elapsed:?} waiting for a floating license seat (last exit code {})",
        format_exit_code(*last_exit_code)
    )]
    LicenseTimedOut {
        last_exit_code: i32,
        elapsed: Duration,
    },

    #[error(
        "Could not acquire a floating license within {elapsed:?}: unexpected exit code {}",
        format_exit_code(*exit_code)
    )]
    FloatingLicenseFailed { exit_code: i32, elapsed: Duration },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to start `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Only produced when the caller opted out of `ignore_return_code`.
    #[error("`{command}` failed with exit code {}: {stderr}", format_exit_code(*exit_code))]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SetupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_not_found_display() {
        let err = SetupError::BinaryNotFound(PathBuf::from(r"C:\tools\advinst\bin\x86\advancedinstaller.com"));
        assert_eq!(
            err.to_string(),
            r"Expected to find C:\tools\advinst\bin\x86\advancedinstaller.com, but it was not found."
        );
    }

    #[test]
    fn test_license_timeout_display_uses_hex_exit_code() {
        let err = SetupError::LicenseTimedOut {
            last_exit_code: 0xE001_006D_u32 as i32,
            elapsed: Duration::from_secs(180),
        };
        let msg = err.to_string();
        assert!(msg.contains("0xE001006D"));
        assert!(msg.contains("180s"));
    }

    #[test]
    fn test_command_failed_display() {
        let err = SetupError::CommandFailed {
            command: "msiexec /qn".to_string(),
            exit_code: 1603,
            stderr: "fatal error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`msiexec /qn` failed with exit code 1603: fatal error"
        );
    }
}
