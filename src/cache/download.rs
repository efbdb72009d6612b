//! Tool downloads.
//!
//! Downloads stream into a uniquely named file under the temp directory.
//! Transient failures (network errors, 5xx, 408, 429) are retried a bounded
//! number of times with a randomized pause, like the Actions tool cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, SetupError};
use crate::utils::format_bytes;

/// Fetches a URL into a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `temp_dir` and return the file path.
    async fn download(&self, url: &str, temp_dir: &Path) -> Result<PathBuf>;
}

/// Retry configuration for downloads.
#[derive(Debug, Clone)]
pub struct DownloadRetry {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DownloadRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl DownloadRetry {
    fn next_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Outcome of a single attempt that did not produce a file.
enum AttemptError {
    Retryable(String),
    Fatal(SetupError),
}

/// HTTP downloader backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    retry: DownloadRetry,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        Self::with_retry(DownloadRetry::default())
    }

    pub fn with_retry(retry: DownloadRetry) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("advinst-setup/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, retry })
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
    }

    async fn attempt(&self, url: &str, dest: &Path) -> std::result::Result<(), AttemptError> {
        let mut response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Err(AttemptError::Retryable(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {}", status);
            if Self::is_retryable_status(status) {
                return Err(AttemptError::Retryable(message));
            }
            return Err(AttemptError::Fatal(SetupError::Download {
                url: url.to_string(),
                message,
            }));
        }

        let progress = match response.content_length() {
            Some(len) => {
                let pb = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                {
                    pb.set_style(style);
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        };

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| AttemptError::Fatal(e.into()))?;

        let mut written: u64 = 0;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| AttemptError::Fatal(e.into()))?;
                    written += chunk.len() as u64;
                    progress.set_position(written);
                }
                Ok(None) => break,
                Err(e) => {
                    progress.abandon();
                    return Err(AttemptError::Retryable(e.to_string()));
                }
            }
        }

        file.flush().await.map_err(|e| AttemptError::Fatal(e.into()))?;
        progress.finish_and_clear();
        tracing::info!("Downloaded {}", format_bytes(written));
        Ok(())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, temp_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(temp_dir).await?;
        let dest = temp_dir.join(uuid::Uuid::new_v4().to_string());

        tracing::debug!("Downloading {} to {}", url, dest.display());

        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(url, &dest).await {
                Ok(()) => return Ok(dest),
                Err(AttemptError::Fatal(e)) => {
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(e);
                }
                Err(AttemptError::Retryable(message)) => {
                    let _ = tokio::fs::remove_file(&dest).await;
                    last_error = message;
                    if attempt < attempts {
                        let delay = self.retry.next_delay();
                        tracing::warn!(
                            "Download attempt {}/{} failed: {}. Retrying in {:?}",
                            attempt,
                            attempts,
                            last_error,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(SetupError::Download {
            url: url.to_string(),
            message: format!("giving up after {} attempts: {}", attempts, last_error),
        })
    }
}
