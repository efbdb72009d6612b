//! End-to-end provisioning of one Advanced Installer installation.
//!
//! Resolves the install through the artifact cache, checks the binary,
//! applies licensing and optionally registers the COM automation interface.
//! Environment changes are *returned* in [`ProvisionedTool`]; applying them
//! to the workflow is left to the caller so nothing is exported for a
//! provisioning run that failed halfway.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::cache::ArtifactCache;
use crate::config::ToolSpec;
use crate::error::{Result, SetupError};
use crate::license::LicenseAcquirer;
use crate::process::{CommandLine, ExecOptions, ProcessRunner};
use crate::utils::join_native;

pub const ROOT_VAR: &str = "AdvancedInstallerRoot";
pub const MSBUILD_TARGETS_VAR: &str = "AdvancedInstallerMSBuildTargets";

const BINARY_DIR: [&str; 2] = ["bin", "x86"];
const BINARY_NAME: &str = "advancedinstaller.com";
const MSBUILD_TARGETS_DIR: [&str; 4] = [
    "ProgramFilesFolder",
    "MSBuild",
    "Caphyon",
    "Advanced Installer",
];

/// A provisioned, licensed installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedTool {
    pub version: String,
    pub install_root: PathBuf,
    pub binary_path: PathBuf,
}

impl ProvisionedTool {
    pub fn new(version: impl Into<String>, install_root: impl Into<PathBuf>) -> Self {
        let install_root = install_root.into();
        let binary_path = binary_path(&install_root);
        Self {
            version: version.into(),
            install_root,
            binary_path,
        }
    }

    /// Environment variables consumed by downstream build steps.
    pub fn exports(&self) -> Vec<(&'static str, String)> {
        let root = self.install_root.to_string_lossy();
        vec![
            (ROOT_VAR, root.to_string()),
            (MSBUILD_TARGETS_VAR, join_native(&root, &MSBUILD_TARGETS_DIR)),
        ]
    }

    /// Directory to put on the search path: the one holding the binary.
    pub fn path_entry(&self) -> String {
        join_native(&self.install_root.to_string_lossy(), &BINARY_DIR)
    }
}

/// Location of the command-line tool under an install root.
pub fn binary_path(install_root: &Path) -> PathBuf {
    let mut segments = BINARY_DIR.to_vec();
    segments.push(BINARY_NAME);
    PathBuf::from(join_native(&install_root.to_string_lossy(), &segments))
}

pub fn com_register_command(binary: &Path) -> CommandLine {
    CommandLine::new(binary.to_string_lossy()).arg("/REGSERVER")
}

/// Orchestrates cache resolution, licensing and COM registration.
pub struct ToolProvisioner {
    cache: ArtifactCache,
    license: LicenseAcquirer,
    runner: Arc<dyn ProcessRunner>,
}

impl ToolProvisioner {
    pub fn new(cache: ArtifactCache, license: LicenseAcquirer, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            cache,
            license,
            runner,
        }
    }

    /// Provision `spec` and return where the tool lives.
    ///
    /// Steps run in order and the first failure stops the rest:
    /// resolve, binary check, licensing, COM registration.
    pub async fn get_path(&self, spec: &ToolSpec) -> Result<ProvisionedTool> {
        let root = self.cache.resolve(spec).await?;
        let tool = ProvisionedTool::new(&spec.version, root);

        if !tool.binary_path.exists() {
            return Err(SetupError::BinaryNotFound(tool.binary_path));
        }

        if let Some(key) = spec.fixed_license() {
            self.license.register(&tool.binary_path, key).await?;
        } else if spec.floating_license {
            self.license.register_floating(&tool.binary_path, spec).await?;
        }

        if spec.enable_com {
            self.register_com(&tool.binary_path).await?;
        }

        Ok(tool)
    }

    async fn register_com(&self, binary: &Path) -> Result<()> {
        tracing::info!("Enabling advinst COM interface");

        let result = self
            .runner
            .run(&com_register_command(binary), ExecOptions::default())
            .await?;
        if !result.success() {
            return Err(SetupError::ComRegistrationFailed(result.stdout));
        }
        Ok(())
    }
}
