use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::actions::{Console, Workflow};
use crate::cache::{ArtifactCache, CacheSettings, HttpDownloader};
use crate::config::{RawInputs, ToolSpec};
use crate::error::{Result, SetupError};
use crate::license::LicenseAcquirer;
use crate::process::SystemRunner;
use crate::provision::{ProvisionedTool, ToolProvisioner};
use crate::utils::format_duration;

const DEPLOY_GROUP: &str = "Advanced Installer Tool Deploy";

#[derive(Parser, Debug)]
#[command(name = "advinst-setup")]
#[command(about = "Provision Advanced Installer on a CI runner")]
#[command(long_about = "Download, cache and license Advanced Installer, then export its location to later workflow steps.\n\nEvery option falls back to the matching GitHub Actions input.")]
pub struct Cli {
    /// Advanced Installer version to provision (e.g. 22.1)
    #[arg(long, env = "INPUT_ADVINST-VERSION")]
    pub version: Option<String>,

    /// Fixed license key. Takes precedence over floating licensing
    #[arg(long, env = "INPUT_ADVINST-LICENSE", hide_env_values = true)]
    pub license: Option<String>,

    /// Register the COM automation interface
    #[arg(long, env = "INPUT_ADVINST-ENABLE-AUTOMATION", num_args = 0..=1, default_missing_value = "true")]
    pub enable_automation: Option<String>,

    /// Acquire a seat from a floating license server
    #[arg(long, env = "INPUT_ADVINST-FLOATING-LICENSE", num_args = 0..=1, default_missing_value = "true")]
    pub floating_license: Option<String>,

    /// Floating license server host
    #[arg(long, env = "INPUT_ADVINST-LICENSE-HOST")]
    pub license_host: Option<String>,

    /// Floating license server port (default: 1024)
    #[arg(long, env = "INPUT_ADVINST-LICENSE-PORT")]
    pub license_port: Option<String>,

    /// Seconds to keep retrying for a floating seat (default: 180)
    #[arg(long, env = "INPUT_ADVINST-LICENSE-TIMEOUT")]
    pub license_timeout: Option<String>,

    /// Download the installer from this URL instead of the official one
    #[arg(long, env = "advancedinstaller_url")]
    pub download_url: Option<String>,

    /// Tool cache root
    #[arg(long, env = "RUNNER_TOOL_CACHE")]
    pub tool_cache: Option<String>,

    /// Scratch directory for downloads and extraction
    #[arg(long, env = "RUNNER_TEMP")]
    pub temp_dir: Option<String>,

    /// Abort provisioning after this many seconds
    #[arg(long)]
    pub job_timeout: Option<u64>,

    /// Print the provisioned tool as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub async fn execute(self, workflow: &Workflow) -> Result<()> {
        if !cfg!(windows) {
            return Err(SetupError::PlatformUnsupported(
                std::env::consts::OS.to_string(),
            ));
        }

        let spec = self.prepare(workflow)?;
        let provisioner = self.system_provisioner()?;
        let tool = self.deploy(&spec, &provisioner, workflow).await?;

        if self.json {
            write_report(&mut std::io::stdout().lock(), &tool)?;
        }
        Ok(())
    }

    /// Where workflow commands and logs go. `--json` keeps stdout for the
    /// report alone.
    pub fn console(&self) -> Console {
        if self.json {
            Console::Stderr
        } else {
            Console::Stdout
        }
    }

    /// Mask the key and turn the raw inputs into a validated spec.
    fn prepare(&self, workflow: &Workflow) -> Result<ToolSpec> {
        if let Some(license) = &self.license {
            workflow.mask(license.trim());
        }

        let spec = self.raw_inputs().into_spec()?;
        if spec.floating_license && spec.fixed_license().is_some() {
            workflow.warning("advinst-license is set; ignoring advinst-floating-license");
        }
        if !workflow.is_actions() {
            tracing::debug!("Not running under GitHub Actions; exports only affect this process");
        }
        tracing::debug!(
            "Inputs: {}",
            serde_json::to_string(&spec).unwrap_or_else(|_| spec.version.clone())
        );
        Ok(spec)
    }

    fn raw_inputs(&self) -> RawInputs {
        RawInputs {
            version: self.version.clone(),
            license: self.license.clone(),
            enable_automation: self.enable_automation.clone(),
            floating_license: self.floating_license.clone(),
            license_host: self.license_host.clone(),
            license_port: self.license_port.clone(),
            license_timeout: self.license_timeout.clone(),
        }
    }

    fn cache_settings(&self) -> CacheSettings {
        let tool_cache = expand_dir(self.tool_cache.as_deref()).unwrap_or_else(default_tool_cache);
        let temp_dir = expand_dir(self.temp_dir.as_deref()).unwrap_or_else(std::env::temp_dir);

        CacheSettings {
            tool_cache,
            temp_dir,
            custom_url: self.download_url.clone(),
        }
    }

    fn system_provisioner(&self) -> Result<ToolProvisioner> {
        let settings = self.cache_settings();
        tracing::debug!(
            "Tool cache: {}, temp: {}",
            settings.tool_cache.display(),
            settings.temp_dir.display()
        );

        let runner = Arc::new(SystemRunner::new());
        let cache = ArtifactCache::new(settings, Arc::new(HttpDownloader::new()?), runner.clone());
        Ok(ToolProvisioner::new(cache, LicenseAcquirer::new(runner.clone()), runner))
    }

    /// Provision inside the deploy group, then publish the result.
    ///
    /// Nothing reaches the workflow files unless every step succeeded.
    async fn deploy(
        &self,
        spec: &ToolSpec,
        provisioner: &ToolProvisioner,
        workflow: &Workflow,
    ) -> Result<ProvisionedTool> {
        workflow.group(DEPLOY_GROUP);
        let result = self.provision(spec, provisioner).await;
        workflow.end_group();
        let tool = result?;

        workflow.apply(&tool)?;
        Ok(tool)
    }

    /// Run the provisioning session, racing Ctrl-C and the job timeout.
    async fn provision(&self, spec: &ToolSpec, provisioner: &ToolProvisioner) -> Result<ProvisionedTool> {
        let session = with_deadline(
            provisioner.get_path(spec),
            self.job_timeout.map(Duration::from_secs),
        );

        tokio::select! {
            result = session => result,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                Err(SetupError::Cancelled("interrupted".to_string()))
            }
        }
    }
}

/// Pretty JSON report, one document followed by a newline.
fn write_report(out: &mut impl Write, tool: &ProvisionedTool) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, tool)?;
    writeln!(out)?;
    Ok(())
}

/// Await `fut`, failing with `Cancelled` once `limit` elapses.
async fn with_deadline<T>(
    fut: impl Future<Output = Result<T>>,
    limit: Option<Duration>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            SetupError::Cancelled(format!(
                "job timeout of {} exceeded",
                format_duration(limit.as_secs())
            ))
        })?,
        None => fut.await,
    }
}

fn expand_dir(value: Option<&str>) -> Option<PathBuf> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| PathBuf::from(shellexpand::tilde(v).to_string()))
}

fn default_tool_cache() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("advinst-setup")
        .join("tools")
}
