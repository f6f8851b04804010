use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use satrep_sdk::{FailurePolicy, ReportSettings};
use serde::{Deserialize, Serialize};
use url::Url;

/// Location read when no configuration file is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/satrep/satrep.toml";

/// Connection and report configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Host name or base URL of the inventory server.
    pub server: String,
    pub username: String,
    pub password: Option<String>,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_cert: Option<PathBuf>,
    pub insecure: bool,
    pub timeout_secs: u64,
    pub workers: usize,
    pub reports: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            username: "admin".to_string(),
            password: None,
            ca_cert: None,
            insecure: false,
            timeout_secs: 60,
            workers: 4,
            reports: ReportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub organization_id: u32,
    pub per_page: u32,
    pub hypervisor_per_page: u32,
    /// Search pattern (`%` wildcard) naming virt-who reporting hosts.
    pub virt_host_pattern: String,
    pub hypervisor_prefix: String,
    pub global_parameter: String,
    pub host_parameter: String,
    pub errata_prefix: String,
    pub failure_policy: FailurePolicy,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let settings = ReportSettings::default();
        Self {
            organization_id: settings.organization_id,
            per_page: settings.per_page,
            hypervisor_per_page: settings.hypervisor_per_page,
            virt_host_pattern: settings.virt_host_pattern,
            hypervisor_prefix: settings.hypervisor_prefix,
            global_parameter: settings.global_parameter,
            host_parameter: settings.host_parameter,
            errata_prefix: settings.errata_prefix,
            failure_policy: settings.failure_policy,
        }
    }
}

impl Config {
    /// Reads `path`, or [`DEFAULT_CONFIG_PATH`] when present, or falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(Into::into)
    }

    /// Base URL of the server with a trailing slash; bare host names get `https://`.
    pub fn base_url(&self) -> Result<Url> {
        let server = self.server.trim();
        let mut raw = if server.contains("://") {
            server.to_string()
        } else {
            format!("https://{}", server)
        };
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("invalid server address `{}`", self.server))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(anyhow!("server must not be empty"));
        }
        let base = self.base_url()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!("server scheme must be http or https, got {}", base.scheme()));
        }
        if self.username.is_empty() && self.password.is_some() {
            return Err(anyhow!("password given without a username"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than zero"));
        }
        if !(1..=64).contains(&self.workers) {
            return Err(anyhow!("workers must be between 1 and 64, got {}", self.workers));
        }
        if self.reports.per_page == 0 || self.reports.hypervisor_per_page == 0 {
            return Err(anyhow!("page sizes must be greater than zero"));
        }
        for (name, value) in [
            ("virt_host_pattern", &self.reports.virt_host_pattern),
            ("global_parameter", &self.reports.global_parameter),
            ("host_parameter", &self.reports.host_parameter),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", name));
            }
        }
        Ok(())
    }

    pub fn report_settings(&self, fact: Option<String>) -> ReportSettings {
        let reports = &self.reports;
        ReportSettings {
            organization_id: reports.organization_id,
            per_page: reports.per_page,
            hypervisor_per_page: reports.hypervisor_per_page,
            virt_host_pattern: reports.virt_host_pattern.clone(),
            hypervisor_prefix: reports.hypervisor_prefix.clone(),
            global_parameter: reports.global_parameter.clone(),
            host_parameter: reports.host_parameter.clone(),
            errata_prefix: reports.errata_prefix.clone(),
            fact,
            failure_policy: reports.failure_policy,
        }
    }
}
