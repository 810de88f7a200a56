//! Application configuration: the ambient tunables that sit around the
//! connection layer's own [`crate::net::Config`] (queue sizes, deadlines).
//! Loaded from a JSON file next to other per-user config, with environment
//! variable overrides, following the pattern used throughout this codebase.

use std::path::PathBuf;
use std::{fs, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "portage";

/// User-facing configuration, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of server-side worker tasks.
    pub worker_count: usize,
    /// Maximum frame body accepted from the wire.
    pub max_frame_body: u64,
    /// Maximum single file size this tool will copy.
    pub max_file_size: u64,
    /// Consecutive bad-envelope failures before the server exits.
    pub wrong_password_threshold: u64,
    /// TCP keepalive probe period, in seconds.
    pub tcp_keepalive_secs: u64,
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let net_defaults = crate::net::Config::default();
        Self {
            worker_count: net_defaults.worker_count,
            max_frame_body: net_defaults.max_frame_body,
            max_file_size: net_defaults.max_frame_body,
            wrong_password_threshold: net_defaults.wrong_password_threshold,
            tcp_keepalive_secs: net_defaults.tcp_keepalive_period.as_secs(),
            timeout_secs: net_defaults.timeout_dur.as_secs(),
        }
    }
}

impl Config {
    /// Load from the on-disk config file, falling back to defaults, then
    /// apply environment variable overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from_file().unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();
        config
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path()?;
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing config")?;
        fs::write(&path, json).with_context(|| format!("writing config at {}", path.display()))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("could not determine config directory")?
            .join(APP_NAME)
            .join("config.json"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PORTAGE_WORKER_COUNT") {
            if let Ok(n) = val.parse() {
                self.worker_count = n;
            }
        }
        if let Ok(val) = std::env::var("PORTAGE_MAX_FILE_SIZE") {
            if let Ok(n) = val.parse() {
                self.max_file_size = n;
            }
        }
        if let Ok(val) = std::env::var("PORTAGE_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.timeout_secs = n;
            }
        }
    }

    /// Build the connection-layer [`crate::net::Config`] implied by these settings.
    pub fn net_config(&self) -> crate::net::Config {
        let mut net_config = crate::net::Config::default();
        net_config.worker_count = self.worker_count;
        net_config.max_frame_body = self.max_frame_body;
        net_config.wrong_password_threshold = self.wrong_password_threshold;
        net_config.tcp_keepalive_period = Duration::from_secs(self.tcp_keepalive_secs);
        net_config.timeout_dur = Duration::from_secs(self.timeout_secs);
        net_config
    }
}
