//! Artifact cache for the Advanced Installer toolset.
//!
//! Resolves a [`ToolSpec`] to an installation directory: a cache hit is
//! returned as-is, a miss is downloaded, extracted with an administrative
//! msiexec install, and stored in the tool cache.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ ArtifactCache │  ← resolve(spec) -> install root
//! └───────┬───────┘
//!         │
//!    ┌────┼──────────────┐
//!    ▼    ▼              ▼
//! ┌──────────┐ ┌────────────┐ ┌───────────────┐
//! │ToolCache │ │ Downloader │ │ ProcessRunner │  (msiexec /a)
//! └──────────┘ └────────────┘ └───────────────┘
//! ```

pub mod download;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use download::{Downloader, HttpDownloader};
pub use store::{CacheKey, ToolCache};

use crate::config::ToolSpec;
use crate::error::{Result, SetupError};
use crate::process::{CommandLine, ExecOptions, ProcessRunner};
use crate::utils::join_native;

/// Tool-cache name of the Advanced Installer installation
pub const TOOL_NAME: &str = "advinst";

/// Only the x86 toolset is published
pub const TOOL_ARCH: &str = "x86";

const DOWNLOAD_URL_BASE: &str = "https://www.advancedinstaller.com/downloads";

/// Canonical download URL for `version`.
pub fn download_url(version: &str) -> String {
    format!("{}/{}/advinst.msi", DOWNLOAD_URL_BASE, version)
}

/// Administrative install: unpacks the MSI into `target_dir` without
/// registering anything on the machine.
pub fn extract_command(setup: &Path, target_dir: &Path) -> CommandLine {
    CommandLine::new("msiexec")
        .arg("/a")
        .arg(format!("\"{}\"", setup.display()))
        .arg(format!("TARGETDIR=\"{}\"", target_dir.display()))
        .arg("/qn")
}

/// Where downloads and extraction scratch space go.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Tool cache root
    pub tool_cache: PathBuf,

    /// Scratch directory for downloads and extraction
    pub temp_dir: PathBuf,

    /// Download URL override, used verbatim
    pub custom_url: Option<String>,
}

/// Get-or-create access to cached installations.
pub struct ArtifactCache {
    store: ToolCache,
    temp_dir: PathBuf,
    custom_url: Option<String>,
    downloader: Arc<dyn Downloader>,
    runner: Arc<dyn ProcessRunner>,
}

impl ArtifactCache {
    pub fn new(
        settings: CacheSettings,
        downloader: Arc<dyn Downloader>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            store: ToolCache::new(settings.tool_cache),
            temp_dir: settings.temp_dir,
            custom_url: settings.custom_url.filter(|u| !u.trim().is_empty()),
            downloader,
            runner,
        }
    }

    pub fn key(spec: &ToolSpec) -> CacheKey {
        CacheKey::new(TOOL_NAME, &spec.version, TOOL_ARCH)
    }

    /// Resolve `spec` to an install root, downloading on a cache miss.
    pub async fn resolve(&self, spec: &ToolSpec) -> Result<PathBuf> {
        let key = Self::key(spec);
        tracing::info!("Checking cache for advinst tool with version: {}", key.version);

        if let Some(root) = self.store.find(&key) {
            tracing::info!("Tool found in cache");
            return Ok(root);
        }

        tracing::info!("Tool not found in cache");
        let setup = self.download(spec).await?;
        self.extract(&setup, &key).await
    }

    /// The URL a cache miss downloads from.
    pub fn source_url(&self, spec: &ToolSpec) -> String {
        match &self.custom_url {
            Some(url) => url.clone(),
            None => download_url(&spec.version),
        }
    }

    async fn download(&self, spec: &ToolSpec) -> Result<PathBuf> {
        let url = self.source_url(spec);
        if self.custom_url.is_some() {
            tracing::info!("Using custom URL for advinst tool: {}", url);
        } else {
            tracing::info!("Downloading advinst tool with version: {}", spec.version);
        }
        self.downloader.download(&url, &self.temp_dir).await
    }

    async fn extract(&self, setup: &Path, key: &CacheKey) -> Result<PathBuf> {
        tracing::info!("Extracting advinst tool");

        let temp = self.temp_dir.to_string_lossy();
        let extract_dir = PathBuf::from(join_native(&temp, &[TOOL_NAME]));
        // The temp dir can outlive this process; start from an empty target
        remove_dir_if_exists(&extract_dir).await?;
        let cmd = extract_command(setup, &extract_dir);

        let result = self.runner.run(&cmd, ExecOptions::default()).await?;
        if !result.success() {
            return Err(SetupError::ExtractionFailed(result.stdout));
        }

        let cached = self.store.cache_dir(&extract_dir, key).await?;
        if let Err(e) = remove_dir_if_exists(&extract_dir).await {
            tracing::debug!("Leaving {} behind: {}", extract_dir.display(), e);
        }
        Ok(cached)
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
