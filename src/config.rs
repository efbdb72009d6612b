//! Provisioning inputs.
//!
//! Inputs arrive as raw strings (GitHub Actions passes every `with:` value
//! as an `INPUT_*` environment variable, empty when unset) and are turned
//! into an immutable [`ToolSpec`] here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SetupError};

pub const DEFAULT_LICENSE_PORT: u16 = 1024;
pub const DEFAULT_ACQUISITION_TIMEOUT_SECS: u32 = 180;

/// Everything needed to provision one Advanced Installer installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool version, e.g. "22.1".
    pub version: String,

    /// Fixed license key. Takes precedence over floating licensing.
    #[serde(default, skip_serializing)]
    pub license_key: Option<String>,

    /// Register the COM automation interface after licensing.
    #[serde(default)]
    pub enable_com: bool,

    /// Acquire a seat from a floating license server.
    #[serde(default)]
    pub floating_license: bool,

    #[serde(default)]
    pub license_host: String,

    #[serde(default = "default_license_port")]
    pub license_port: u16,

    /// How long to keep retrying for a floating seat.
    #[serde(default = "default_acquisition_timeout")]
    pub acquisition_timeout_secs: u32,
}

fn default_license_port() -> u16 {
    DEFAULT_LICENSE_PORT
}

fn default_acquisition_timeout() -> u32 {
    DEFAULT_ACQUISITION_TIMEOUT_SECS
}

impl ToolSpec {
    /// Create a spec for `version` with no licensing and COM disabled
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            license_key: None,
            enable_com: false,
            floating_license: false,
            license_host: String::new(),
            license_port: DEFAULT_LICENSE_PORT,
            acquisition_timeout_secs: DEFAULT_ACQUISITION_TIMEOUT_SECS,
        }
    }

    /// Set the fixed license key, trimmed. An empty key means "unset".
    pub fn with_license_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        let key = key.trim();
        self.license_key = if key.is_empty() { None } else { Some(key.to_string()) };
        self
    }

    pub fn with_com(mut self, enable: bool) -> Self {
        self.enable_com = enable;
        self
    }

    /// Enable floating licensing against `host:port`
    pub fn with_floating_license(mut self, host: impl Into<String>, port: u16) -> Self {
        self.floating_license = true;
        self.license_host = host.into();
        self.license_port = port;
        self
    }

    pub fn with_acquisition_timeout(mut self, seconds: u32) -> Self {
        self.acquisition_timeout_secs = seconds;
        self
    }

    /// The fixed license key, if one is configured.
    pub fn fixed_license(&self) -> Option<&str> {
        self.license_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Whether the floating branch will run. Never true when a fixed key is set.
    pub fn uses_floating_license(&self) -> bool {
        self.floating_license && self.fixed_license().is_none()
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.acquisition_timeout_secs))
    }

    /// Validate the spec.
    ///
    /// Returns an error if the version is missing or floating licensing is
    /// requested without a license server host.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(SetupError::Config(
                "advinst-version is required".to_string(),
            ));
        }

        if self.version.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(SetupError::Config(format!(
                "Invalid advinst-version '{}'",
                self.version
            )));
        }

        if self.uses_floating_license() && self.license_host.trim().is_empty() {
            return Err(SetupError::Config(
                "advinst-license-host is required when advinst-floating-license is enabled"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Raw provisioning inputs, as strings.
///
/// Empty strings mean "not provided", matching how the Actions runner
/// passes unset inputs.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    pub version: Option<String>,
    pub license: Option<String>,
    pub enable_automation: Option<String>,
    pub floating_license: Option<String>,
    pub license_host: Option<String>,
    pub license_port: Option<String>,
    pub license_timeout: Option<String>,
}

impl RawInputs {
    /// Parse and validate into a [`ToolSpec`]
    pub fn into_spec(self) -> Result<ToolSpec> {
        let version = non_empty(self.version).unwrap_or_default();

        let mut spec = ToolSpec::new(version.trim())
            .with_license_key(non_empty(self.license).unwrap_or_default())
            .with_com(parse_bool_input(
                "advinst-enable-automation",
                self.enable_automation.as_deref(),
            )?);

        if parse_bool_input("advinst-floating-license", self.floating_license.as_deref())? {
            let port = match non_empty(self.license_port) {
                Some(p) => parse_number::<u16>("advinst-license-port", &p)?,
                None => DEFAULT_LICENSE_PORT,
            };
            let host = non_empty(self.license_host).unwrap_or_default();
            spec = spec.with_floating_license(host.trim(), port);
        }

        if let Some(timeout) = non_empty(self.license_timeout) {
            spec = spec.with_acquisition_timeout(parse_number::<u32>(
                "advinst-license-timeout",
                &timeout,
            )?);
        }

        spec.validate()?;
        Ok(spec)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a boolean input the way the Actions toolkit does.
///
/// Accepts `true|True|TRUE|false|False|FALSE`; unset or empty is false.
pub fn parse_bool_input(name: &str, value: Option<&str>) -> Result<bool> {
    match value.map(str::trim) {
        None | Some("") => Ok(false),
        Some("true" | "True" | "TRUE") => Ok(true),
        Some("false" | "False" | "FALSE") => Ok(false),
        Some(other) => Err(SetupError::Config(format!(
            "Input '{}' does not meet YAML 1.2 \"Core Schema\" specification: '{}'. \
             Support boolean input list: `true | True | TRUE | false | False | FALSE`",
            name, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        SetupError::Config(format!("Invalid value for '{}': '{}'", name, value.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(version: &str) -> RawInputs {
        RawInputs {
            version: Some(version.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_tool_spec_defaults() {
        let spec = ToolSpec::new("22.1");
        assert_eq!(spec.version, "22.1");
        assert!(spec.license_key.is_none());
        assert!(!spec.enable_com);
        assert!(!spec.floating_license);
        assert_eq!(spec.license_port, 1024);
        assert_eq!(spec.acquisition_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_empty_license_key_is_unset() {
        let spec = ToolSpec::new("22.1").with_license_key("   ");
        assert!(spec.license_key.is_none());
        assert!(spec.fixed_license().is_none());
    }

    #[test]
    fn test_fixed_license_takes_precedence_over_floating() {
        let spec = ToolSpec::new("22.1")
            .with_license_key("KEY-123")
            .with_floating_license("", 1024);
        assert!(spec.floating_license);
        assert!(!spec.uses_floating_license());
        // No host needed: floating never runs with a fixed key
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_version() {
        let err = ToolSpec::new("").validate().unwrap_err();
        assert!(err.to_string().contains("advinst-version is required"));
    }

    #[test]
    fn test_validate_rejects_path_like_version() {
        let err = ToolSpec::new("../22.1").validate().unwrap_err();
        assert!(err.to_string().contains("Invalid advinst-version"));
    }

    #[test]
    fn test_validate_floating_requires_host() {
        let err = ToolSpec::new("22.1")
            .with_floating_license(" ", 1024)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("advinst-license-host"));
    }

    #[test]
    fn test_parse_bool_input() {
        assert!(parse_bool_input("x", Some("true")).unwrap());
        assert!(parse_bool_input("x", Some("True")).unwrap());
        assert!(parse_bool_input("x", Some("TRUE")).unwrap());
        assert!(!parse_bool_input("x", Some("false")).unwrap());
        assert!(!parse_bool_input("x", Some("")).unwrap());
        assert!(!parse_bool_input("x", None).unwrap());
        assert!(parse_bool_input("x", Some("yes")).is_err());
        assert!(parse_bool_input("x", Some("tRuE")).is_err());
    }

    #[test]
    fn test_into_spec_minimal() {
        let spec = inputs(" 22.1 ").into_spec().unwrap();
        assert_eq!(spec, ToolSpec::new("22.1"));
    }

    #[test]
    fn test_into_spec_full_floating() {
        let raw = RawInputs {
            version: Some("22.1".to_string()),
            license: Some(String::new()),
            enable_automation: Some("true".to_string()),
            floating_license: Some("true".to_string()),
            license_host: Some("licenses.internal".to_string()),
            license_port: Some("2048".to_string()),
            license_timeout: Some("30".to_string()),
        };

        let spec = raw.into_spec().unwrap();
        assert!(spec.enable_com);
        assert!(spec.uses_floating_license());
        assert_eq!(spec.license_host, "licenses.internal");
        assert_eq!(spec.license_port, 2048);
        assert_eq!(spec.acquisition_timeout_secs, 30);
    }

    #[test]
    fn test_into_spec_empty_port_uses_default() {
        let raw = RawInputs {
            floating_license: Some("true".to_string()),
            license_host: Some("host".to_string()),
            license_port: Some(String::new()),
            ..inputs("22.1")
        };
        assert_eq!(raw.into_spec().unwrap().license_port, DEFAULT_LICENSE_PORT);
    }

    #[test]
    fn test_into_spec_invalid_port() {
        let raw = RawInputs {
            floating_license: Some("true".to_string()),
            license_host: Some("host".to_string()),
            license_port: Some("70000".to_string()),
            ..inputs("22.1")
        };
        let err = raw.into_spec().unwrap_err();
        assert!(err.to_string().contains("advinst-license-port"));
    }

    #[test]
    fn test_into_spec_invalid_boolean() {
        let raw = RawInputs {
            enable_automation: Some("on".to_string()),
            ..inputs("22.1")
        };
        assert!(raw.into_spec().is_err());
    }

    #[test]
    fn test_into_spec_trims_padded_license_key() {
        let raw = RawInputs {
            license: Some("  KEY-1234 \n".to_string()),
            ..inputs("22.1")
        };
        let spec = raw.into_spec().unwrap();
        assert_eq!(spec.license_key.as_deref(), Some("KEY-1234"));
        assert_eq!(spec.fixed_license(), Some("KEY-1234"));
    }

    #[test]
    fn test_license_key_never_serialized() {
        let spec = ToolSpec::new("22.1").with_license_key("SECRET-KEY");
        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("SECRET-KEY"));
        assert!(json.contains("\"version\":\"22.1\""));
    }
}
