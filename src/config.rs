//! Configuration loading and validation.
//!
//! The relay reads a single human-owned `config.toml`. Secrets never live in
//! the file: `platform.token_env` names the environment variable holding the
//! bot token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::platform::client::DEFAULT_API_BASE;

/// Largest page the platform returns for one fetch.
pub const MAX_FETCH_LIMIT: u32 = 100;

/// Top-level configuration file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Platform endpoint and credentials.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Agent identity.
    pub agent: AgentConfig,

    /// Polling behaviour.
    #[serde(default)]
    pub relay: PollConfig,

    /// Memory persistence.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Platform endpoint and credentials.
#[derive(Debug, Deserialize)]
pub struct PlatformConfig {
    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable name holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Default direct-message channel.
    #[serde(default)]
    pub dm_channel_id: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            dm_channel_id: None,
        }
    }
}

/// Agent identity.
#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier.
    pub id: String,
}

/// Polling behaviour.
#[derive(Debug, Deserialize)]
pub struct PollConfig {
    /// Period between poll ticks, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Messages requested per poll.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

/// Memory persistence.
#[derive(Debug, Default, Deserialize)]
pub struct MemoryConfig {
    /// SQLite database path. Records stay in memory when unset.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

/// The subset of configuration the relay manager runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// REST API base URL.
    pub api_base: String,
    /// Default DM channel, used when the runtime supplies none.
    pub dm_channel_id: Option<String>,
    /// Period between poll ticks.
    pub poll_interval: Duration,
    /// Messages requested per poll.
    pub fetch_limit: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            dm_channel_id: None,
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            fetch_limit: default_fetch_limit(),
        }
    }
}

impl Config {
    /// Relay settings derived from this file.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            api_base: self.platform.api_base.clone(),
            dm_channel_id: self.platform.dm_channel_id.clone(),
            poll_interval: Duration::from_millis(self.relay.poll_interval_ms),
            fetch_limit: self.relay.fetch_limit,
        }
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.platform.api_base).map_err(|e| {
            anyhow::anyhow!("invalid platform.api_base {:?}: {e}", self.platform.api_base)
        })?;
        if self.agent.id.trim().is_empty() {
            anyhow::bail!("agent.id must not be empty");
        }
        if self.relay.poll_interval_ms == 0 {
            anyhow::bail!("relay.poll_interval_ms must be greater than zero");
        }
        if self.relay.fetch_limit == 0 || self.relay.fetch_limit > MAX_FETCH_LIMIT {
            anyhow::bail!("relay.fetch_limit must be between 1 and {MAX_FETCH_LIMIT}");
        }
        Ok(())
    }
}

// Default value functions for serde

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_owned()
}
fn default_token_env() -> String {
    "DISCORD_API_TOKEN".to_owned()
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_fetch_limit() -> u32 {
    50
}

/// Load and validate the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Resolve the default config directory (`~/.discord-relay/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".discord-relay"))
}

/// Logs directory for the config at `config_path`: `logs/` next to the file.
///
/// A bare file name resolves against the current directory.
pub fn logs_dir_for(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("logs"),
        _ => PathBuf::from("logs"),
    }
}
