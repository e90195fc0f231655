//! Configuration management for labtrack.
//!
//! Loads configuration from ${LABTRACK_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `api_url`.
pub const API_URL_ENV: &str = "LABTRACK_API_URL";

/// Token renewal behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Coalesce renewals triggered by concurrent 401 responses into one
    /// refresh call. When false, every failing request renews on its own.
    pub single_flight: bool,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            single_flight: true,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the records service
    pub api_url: String,

    /// Timeout for every outgoing request in seconds (0 disables)
    pub request_timeout_secs: u64,

    /// Also write logs to ${LABTRACK_HOME}/logs
    pub log_to_file: bool,

    /// Token renewal configuration
    #[serde(default)]
    pub renewal: RenewalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: Self::DEFAULT_API_URL.to_string(),
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            log_to_file: false,
            renewal: RenewalConfig::default(),
        }
    }
}

/// Resolved settings the HTTP layer is built from.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub request_timeout: Option<Duration>,
    pub single_flight: bool,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Some(Duration::from_secs(Config::DEFAULT_REQUEST_TIMEOUT_SECS)),
            single_flight: true,
        }
    }
}

impl Config {
    const DEFAULT_API_URL: &str = "https://localhost:8443";
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the default config template to `path`.
    ///
    /// Fails if a file already exists there.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Returns the request timeout, or `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Resolves the settings for the HTTP client.
    ///
    /// The base URL is taken from `LABTRACK_API_URL`, then the config file,
    /// then the built-in default.
    pub fn client_settings(&self) -> Result<ClientSettings> {
        let base_url = resolve_api_url(Some(&self.api_url), API_URL_ENV)?;
        Ok(ClientSettings {
            base_url,
            request_timeout: self.request_timeout(),
            single_flight: self.renewal.single_flight,
        })
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Resolves the API base URL with precedence: env > config > default.
fn resolve_api_url(config_url: Option<&str>, env_var: &str) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    if let Some(config_url) = config_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.to_string());
        }
    }

    Ok(Config::DEFAULT_API_URL.to_string())
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid API URL: {url}"))?;
    Ok(())
}

pub mod paths {
    //! Path resolution for labtrack configuration and data.
    //!
    //! `LABTRACK_HOME` resolution order:
    //! 1. `LABTRACK_HOME` environment variable (if set)
    //! 2. ~/.config/labtrack (default)

    use std::path::PathBuf;

    /// Returns the labtrack home directory.
    pub fn labtrack_home() -> PathBuf {
        if let Ok(home) = std::env::var("LABTRACK_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".labtrack"),
            |h| h.join(".config").join("labtrack"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        labtrack_home().join("config.toml")
    }

    /// Returns the path to the stored credential pair.
    pub fn credentials_path() -> PathBuf {
        labtrack_home().join("credentials.json")
    }

    /// Returns the directory for rolling log files.
    pub fn logs_dir() -> PathBuf {
        labtrack_home().join("logs")
    }
}
