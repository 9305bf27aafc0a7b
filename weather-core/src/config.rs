use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{encoding::TextEncoding, model::TemperatureUnit};

pub const DEFAULT_URL: &str = "https://metasite-weather-api.herokuapp.com/";
pub const DEFAULT_RETRIES: u32 = 3;
pub const MAX_RETRIES: u32 = 1000;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
/// Twelve hours.
pub const MAX_RETRY_DELAY_SECS: u64 = 43_200;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

pub const ENV_URL: &str = "WEATHER_SOURCE_URL";
pub const ENV_USER: &str = "WEATHER_SOURCE_USER";
pub const ENV_PASSWORD: &str = "WEATHER_SOURCE_PASSWORD";

/// Connection settings for the upstream weather provider.
///
/// Example TOML:
/// [source]
/// url = "https://metasite-weather-api.herokuapp.com/"
/// user = "..."
/// password = "..."
/// temperature_unit = "celsius"
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub temperature_unit: TemperatureUnit,
    pub encoding_name: Option<String>,
    pub retries: Option<i64>,
    pub retry_delay_seconds: Option<i64>,
    pub source_id: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            user: String::new(),
            password: String::new(),
            temperature_unit: TemperatureUnit::Celsius,
            encoding_name: Some("UTF8".to_string()),
            retries: Some(1),
            retry_delay_seconds: Some(DEFAULT_RETRY_DELAY_SECS as i64),
            source_id: Some("Metasite".to_string()),
        }
    }
}

impl SourceConfig {
    pub fn is_valid(&self) -> bool {
        !(self.url.trim().is_empty()
            || self.user.trim().is_empty()
            || self.password.trim().is_empty()
            || !is_absolute_url(&self.url))
    }

    /// Human-readable list of problems, one per line; empty when the config is valid.
    pub fn configuration_errors(&self) -> String {
        let mut errors = Vec::new();

        if self.url.trim().is_empty() {
            errors.push("Url is not specified.");
        }
        if !is_absolute_url(&self.url) {
            errors.push("Url is not valid.");
        }
        if self.user.trim().is_empty() {
            errors.push("User is not specified.");
        }
        if self.password.trim().is_empty() {
            errors.push("Password is not specified.");
        }

        errors.join("\n")
    }

    pub fn encoding_or_default(&self) -> TextEncoding {
        self.encoding_name
            .as_deref()
            .map(TextEncoding::from_name)
            .unwrap_or_default()
    }

    /// Extra attempts after the first one. Non-positive values mean "use the default".
    pub fn retries_or_default(&self) -> u32 {
        match self.retries {
            Some(n) if n >= 1 => n.min(MAX_RETRIES as i64) as u32,
            _ => DEFAULT_RETRIES,
        }
    }

    pub fn retry_delay_or_default(&self) -> Duration {
        let secs = match self.retry_delay_seconds {
            Some(n) if n >= 1 => (n as u64).min(MAX_RETRY_DELAY_SECS),
            _ => DEFAULT_RETRY_DELAY_SECS,
        };
        Duration::from_secs(secs)
    }

    pub fn source_id_or_default(&self) -> String {
        self.source_id.as_deref().map(str::trim).unwrap_or_default().to_string()
    }

    /// Join the configured base URL with an API path such as `/api/Cities`.
    pub fn api_method_url(&self, api_method: &str) -> String {
        let base = self.url.trim();
        let base = base.strip_suffix('/').unwrap_or(base);
        format!("{base}{api_method}")
    }

    /// Override credentials and URL from the environment. Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_blank(ENV_URL) {
            self.url = url;
        }
        if let Some(user) = non_blank(ENV_USER) {
            self.user = user;
        }
        if let Some(password) = non_blank(ENV_PASSWORD) {
            self.password = password;
        }
    }
}

fn is_absolute_url(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.is_empty() && url::Url::parse(raw).is_ok_and(|u| u.has_host())
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    /// Seconds between poll cycles.
    pub poll_interval_secs: Option<u64>,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
                .max(1),
        )
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-poller", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
