#[cfg(feature = "cli")]
pub mod cli;

use crate::core::engine::RunSettings;
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api/";
pub const DEFAULT_LDAPS_PORT: u16 = 636;
pub const DEFAULT_OBJECT_CLASS: &str = "organizationalPerson";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Overwrite the target Slack group with the LDAP members that have a Slack account
    #[default]
    Sync,
    /// Print who is in group A but not in group B, for each configured pair
    Diff,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Sync => f.write_str("sync"),
            RunMode::Diff => f.write_str("diff"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub slack: SlackConfig,
    #[serde(default)]
    pub ldap: Option<LdapConfig>,
    #[serde(default)]
    pub default: RunConfig,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    pub security_token: String,
    #[serde(default)]
    pub target_group: Option<String>,
    /// Pairs of `[groupA, groupB]`.
    #[serde(default)]
    pub diff_groups: Vec<[String; 2]>,
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapConfig {
    pub host: String,
    #[serde(default = "default_ldaps_port")]
    pub port: u16,
    pub bind_user: String,
    pub bind_pwd: String,
    #[serde(rename = "groupCNs")]
    pub group_cns: Vec<String>,
    #[serde(rename = "baseCN")]
    pub base_cn: String,
    /// PEM files with CA certificates trusted for the LDAPS connection.
    #[serde(default)]
    pub certificates: Vec<String>,
    #[serde(default)]
    pub client_cert: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default)]
    pub start_tls: bool,
    #[serde(default = "default_object_class")]
    pub object_class: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub write: bool,
    /// Deadline for each directory or Slack call.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Sync,
            write: false,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

fn default_slack_api_url() -> String {
    DEFAULT_SLACK_API_URL.to_string()
}

fn default_ldaps_port() -> u16 {
    DEFAULT_LDAPS_PORT
}

fn default_object_class() -> String {
    DEFAULT_OBJECT_CLASS.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

const MASK: &str = "*********";

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("security_token", &MASK)
            .field("target_group", &self.target_group)
            .field("diff_groups", &self.diff_groups)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bind_user", &self.bind_user)
            .field("bind_pwd", &MASK)
            .field("group_cns", &self.group_cns)
            .field("base_cn", &self.base_cn)
            .field("certificates", &self.certificates)
            .field("client_cert", &self.client_cert)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("start_tls", &self.start_tls)
            .field("object_class", &self.object_class)
            .finish()
    }
}

impl LdapConfig {
    pub fn url(&self) -> String {
        if self.start_tls {
            format!("ldap://{}:{}", self.host, self.port)
        } else {
            format!("ldaps://{}:{}", self.host, self.port)
        }
    }

    fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("ldap.host", &self.host)?;
        validation::validate_range("ldap.port", self.port, 1, u16::MAX)?;
        validation::validate_non_empty_string("ldap.bindUser", &self.bind_user)?;
        validation::validate_non_empty_string("ldap.bindPwd", &self.bind_pwd)?;
        validation::validate_non_empty_list("ldap.groupCNs", &self.group_cns)?;
        validation::validate_non_empty_string("ldap.baseCN", &self.base_cn)?;
        validation::validate_non_empty_string("ldap.objectClass", &self.object_class)?;

        for cert in &self.certificates {
            validation::validate_readable_file("ldap.certificates", cert)?;
        }
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                validation::validate_readable_file("ldap.clientCert", cert)?;
                validation::validate_readable_file("ldap.clientKey", key)?;
            }
            (Some(_), None) => {
                return Err(SyncError::MissingConfigError {
                    field: "ldap.clientKey".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(SyncError::MissingConfigError {
                    field: "ldap.clientCert".to_string(),
                })
            }
            (None, None) => {}
        }
        Ok(())
    }
}

impl Config {
    /// Loads a YAML (or `.toml`) configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(SyncError::IoError)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        serde_yaml::from_str(&processed).map_err(|e| SyncError::ConfigError {
            message: format!("YAML parsing error: {}", e),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        toml::from_str(&processed).map_err(|e| SyncError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. An unset variable is an error.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SyncError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let mut unset = Vec::new();
        let result = re.replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| {
                unset.push(caps[1].to_string());
                String::new()
            })
        });

        if !unset.is_empty() {
            return Err(SyncError::ConfigError {
                message: format!("environment variable(s) not set: {}", unset.join(", ")),
            });
        }
        Ok(result.into_owned())
    }

    pub fn mode(&self) -> RunMode {
        self.default.mode
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.default.timeout_seconds)
    }

    /// The LDAP section, required in sync mode.
    pub fn ldap(&self) -> Result<&LdapConfig> {
        validation::validate_required_field("ldap", &self.ldap)
    }

    /// Settings handed to the engine. Call after [`Validate::validate`].
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            mode: self.default.mode,
            target_group: self.slack.target_group.clone().unwrap_or_default(),
            diff_pairs: self
                .slack
                .diff_groups
                .iter()
                .map(|[a, b]| (a.clone(), b.clone()))
                .collect(),
            group_dns: self
                .ldap
                .as_ref()
                .map(|ldap| ldap.group_cns.clone())
                .unwrap_or_default(),
            write_enabled: self.default.write,
            timeout: self.timeout(),
        }
    }

    /// Human-readable summary with credentials masked.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            format!("mode: {}", self.default.mode),
            format!("write: {}", self.default.write),
            format!("timeout: {}s", self.default.timeout_seconds),
            format!("slack.apiUrl: {}", self.slack.api_url),
            format!("slack.securityToken: {}", MASK),
        ];
        if let Some(target) = &self.slack.target_group {
            lines.push(format!("slack.targetGroup: {}", target));
        }
        for [a, b] in &self.slack.diff_groups {
            lines.push(format!("slack.diffGroups: {} vs {}", a, b));
        }
        if let Some(ldap) = &self.ldap {
            lines.push(format!("ldap.url: {}", ldap.url()));
            lines.push(format!("ldap.bindUser: {}", ldap.bind_user));
            lines.push(format!("ldap.bindPwd: {}", MASK));
            lines.push(format!("ldap.baseCN: {}", ldap.base_cn));
            for group in &ldap.group_cns {
                lines.push(format!("ldap.groupCNs: {}", group));
            }
        }
        lines
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("slack.securityToken", &self.slack.security_token)?;
        validation::validate_url("slack.apiUrl", &self.slack.api_url)?;
        validation::validate_range(
            "default.timeoutSeconds",
            self.default.timeout_seconds,
            1,
            3600,
        )?;

        match self.default.mode {
            RunMode::Sync => {
                let target = validation::validate_required_field(
                    "slack.targetGroup",
                    &self.slack.target_group,
                )?;
                validation::validate_non_empty_string("slack.targetGroup", target)?;
                self.ldap()?.validate_config()?;
            }
            RunMode::Diff => {
                if self.slack.diff_groups.is_empty() {
                    return Err(SyncError::MissingConfigError {
                        field: "slack.diffGroups".to_string(),
                    });
                }
                for [a, b] in &self.slack.diff_groups {
                    validation::validate_non_empty_string("slack.diffGroups", a)?;
                    validation::validate_non_empty_string("slack.diffGroups", b)?;
                }
            }
        }

        Ok(())
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
