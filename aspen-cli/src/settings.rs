//! Application settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use aspen_protocol::{AUTO_UPDATE_WITH_RESPONSE, DEFAULT_PORT};
use aspen_session::config::DEFAULT_HOST;
use aspen_session::{SessionConfig, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};

/// Settings persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Router IP address or host name
    pub host: String,
    /// Router control port
    pub port: u16,
    /// Seconds between full status polls
    #[serde(default = "default_poll_secs")]
    pub poll_secs: f64,
    /// Update mode requested on connect
    #[serde(default = "default_update_mode")]
    pub update_mode: u8,
    /// Show raw protocol traffic on the console
    #[serde(default)]
    pub show_traffic: bool,
}

fn default_poll_secs() -> f64 {
    DEFAULT_POLL_INTERVAL.as_secs_f64()
}

fn default_update_mode() -> u8 {
    AUTO_UPDATE_WITH_RESPONSE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            poll_secs: default_poll_secs(),
            update_mode: default_update_mode(),
            show_traffic: false,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for aspen
    /// Uses $XDG_CONFIG_HOME/aspen on Linux/macOS, falls back to ~/.config/aspen
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("aspen"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("aspen"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::settings_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine settings path"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save settings to a specific file, creating its directory
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Session configuration for these settings
    pub fn session_config(&self) -> SessionConfig {
        // Negative, NaN or absurd values disable polling
        let poll_interval = Duration::try_from_secs_f64(self.poll_secs).unwrap_or(Duration::ZERO);
        SessionConfig {
            poll_interval,
            update_mode: self.update_mode,
            ..SessionConfig::new(self.host.clone(), self.port)
        }
    }
}
