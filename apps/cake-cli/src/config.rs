//! CLI configuration.
//!
//! Reads `{ token, channel, api_base?, timeout_secs? }` from, in order:
//! - the `--config` path
//! - `config.txt` in the working directory (legacy JSON location)
//! - `~/.config/cake/config.toml` (Linux) or `%APPDATA%\cake\config.toml` (Windows)
//!
//! Files ending in `.toml` are TOML; anything else is JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use cake_remote::StoreConfig;
use serde::{Deserialize, Serialize};

const LEGACY_CONFIG_FILE: &str = "config.txt";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Authorization token for posting slices.
    #[serde(default)]
    pub token: String,

    /// Channel that receives the slices.
    #[serde(default)]
    pub channel: String,

    /// API root override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Loads the config named on the command line, or the first one found
    /// in the default locations. No file at all yields an empty config.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let legacy = PathBuf::from(LEGACY_CONFIG_FILE);
        if legacy.is_file() {
            return Self::load(&legacy);
        }

        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::parse(&content, is_toml(path))
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    fn parse(content: &str, toml: bool) -> anyhow::Result<Self> {
        if toml {
            Ok(toml::from_str(content)?)
        } else {
            Ok(serde_json::from_str(content)?)
        }
    }

    pub fn to_store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(self.token.clone(), self.channel.clone());
        if let Some(base) = self.api_base.as_ref().filter(|b| !b.is_empty()) {
            config = config.with_api_base(base.clone());
        }
        if let Some(secs) = self.timeout_secs {
            let connect = config.connect_timeout;
            config = config.with_timeouts(connect, Duration::from_secs(secs));
        }
        config
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

/// Platform default config path.
pub fn default_config_path() -> Option<PathBuf> {
    config_base_dir().map(|dir| dir.join("cake").join("config.toml"))
}

fn config_base_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
