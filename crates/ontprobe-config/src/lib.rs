//! Configuration for ontprobe.
//!
//! TOML profiles layered with `ONTPROBE_` environment variables, password
//! resolution (env reference or plaintext), and translation to
//! `ontprobe_core::ProbeConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ontprobe_api::{AdapterVariant, Credential, TlsMode, Topic};
use ontprobe_core::config::{DEFAULT_MAX_PARALLEL_HOSTS, DEFAULT_UI_TIMEOUT};
use ontprobe_core::{CoreError, CredentialBook, DeviceFamily, ModelMappingTable, ProbeConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password for '{username}' ({family})")]
    NoCredentials { family: String, username: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Hosts to probe when none are given explicitly.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Skip family detection and use this adapter only.
    pub forced_variant: Option<AdapterVariant>,

    /// Topics to fetch; identity always runs first. Empty means all.
    #[serde(default)]
    pub topics: Vec<Topic>,

    /// Extra credentials per device family, tried before the built-in
    /// factory defaults.
    #[serde(default)]
    pub credentials: HashMap<String, Vec<CredentialEntry>>,

    /// Replaces the built-in model table when present.
    pub models: Option<Vec<ModelRow>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_ui_timeout")]
    pub ui_timeout: u64,

    #[serde(default = "default_max_parallel_hosts")]
    pub max_parallel_hosts: usize,

    /// Accept self-signed device certificates.
    #[serde(default = "default_insecure")]
    pub insecure: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            ui_timeout: default_ui_timeout(),
            max_parallel_hosts: default_max_parallel_hosts(),
            insecure: default_insecure(),
        }
    }
}

fn default_timeout() -> u64 {
    8
}
fn default_ui_timeout() -> u64 {
    DEFAULT_UI_TIMEOUT.as_secs()
}
fn default_max_parallel_hosts() -> usize {
    DEFAULT_MAX_PARALLEL_HOSTS
}
fn default_insecure() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialEntry {
    pub username: String,

    /// Plaintext password (prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelRow {
    /// Substring matched against the device's model string.
    pub key: String,
    pub code: String,
    /// Commercial name shown for `code`.
    pub name: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ontprobe", "ontprobe").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("ontprobe");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the platform config file plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` plus environment. A missing file yields defaults.
///
/// Nested keys use a double underscore: `ONTPROBE_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ONTPROBE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Serialize `cfg` to TOML at `path`, creating parent directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a password: env reference first, then plaintext.
pub fn resolve_password<F>(
    entry: &CredentialEntry,
    family: &str,
    env: F,
) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(ref name) = entry.password_env {
        if let Some(val) = env(name) {
            return Ok(SecretString::from(val));
        }
    }
    if let Some(ref pw) = entry.password {
        return Ok(SecretString::from(pw.clone()));
    }
    Err(ConfigError::NoCredentials {
        family: family.into(),
        username: entry.username.clone(),
    })
}

fn parse_family(name: &str) -> Result<DeviceFamily, ConfigError> {
    DeviceFamily::from_str(&name.to_lowercase()).map_err(|_| ConfigError::Validation {
        field: "credentials".into(),
        reason: format!("unknown device family '{name}'"),
    })
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Build a `ProbeConfig`, reading password references from the process
    /// environment.
    pub fn to_probe_config(&self) -> Result<ProbeConfig, ConfigError> {
        self.to_probe_config_with(|name| std::env::var(name).ok())
    }

    pub fn to_probe_config_with<F>(&self, env: F) -> Result<ProbeConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.defaults.max_parallel_hosts == 0 {
            return Err(ConfigError::Validation {
                field: "defaults.max_parallel_hosts".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.defaults.timeout == 0 {
            return Err(ConfigError::Validation {
                field: "defaults.timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        let mut credentials = CredentialBook::builtin();
        for (name, entries) in &self.credentials {
            let family = parse_family(name)?;
            let trial = entries
                .iter()
                .map(|entry| {
                    let password = resolve_password(entry, name, &env)?;
                    Ok(Credential::new(
                        entry.username.clone(),
                        password.expose_secret().to_owned(),
                    ))
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            credentials.prepend(family, trial);
        }

        let models = match self.models {
            Some(ref rows) => {
                let table = ModelMappingTable::new(rows.iter().map(|r| (&r.key, r.code.clone())))?;
                let names = rows
                    .iter()
                    .filter_map(|r| r.name.clone().map(|n| (r.code.clone(), n)));
                Arc::new(table.with_display_names(names))
            }
            None => Arc::new(ModelMappingTable::builtin()),
        };

        let tls = if self.defaults.insecure {
            TlsMode::DangerAcceptInvalid
        } else {
            TlsMode::System
        };

        Ok(ProbeConfig {
            request_timeout: Duration::from_secs(self.defaults.timeout),
            ui_timeout: Duration::from_secs(self.defaults.ui_timeout),
            tls,
            max_parallel_hosts: self.defaults.max_parallel_hosts,
            forced_variant: self.forced_variant,
            topics: if self.topics.is_empty() {
                Topic::ALL.to_vec()
            } else {
                self.topics.clone()
            },
            credentials,
            models,
            ..ProbeConfig::default()
        })
    }
}
