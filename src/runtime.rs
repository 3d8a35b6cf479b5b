//! Agent runtime interface the relay is driven by.
//!
//! The runtime owns the agent identity, its settings and credentials, and the
//! memory store outbound messages are recorded in.

use std::collections::HashMap;
use std::sync::Arc;

use crate::memory::MemoryStore;

/// Setting key holding the bot token.
pub const TOKEN_SETTING: &str = "DISCORD_API_TOKEN";

/// Setting key holding the default direct-message channel.
pub const DM_CHANNEL_SETTING: &str = "DISCORD_DM_CHANNEL_ID";

/// The agent runtime a relay serves.
pub trait AgentRuntime: Send + Sync {
    /// Stable agent identifier.
    fn agent_id(&self) -> &str;

    /// Look up a runtime-specific setting.
    fn setting(&self, key: &str) -> Option<String>;

    /// Fallback token field, consulted when no token setting exists.
    fn token(&self) -> Option<String> {
        None
    }

    /// Store outbound memory records are written to.
    fn memory(&self) -> Arc<dyn MemoryStore>;
}

/// Resolve the bot token: setting, then fallback field, then empty.
pub fn resolve_token(runtime: &dyn AgentRuntime) -> String {
    non_empty(runtime.setting(TOKEN_SETTING))
        .or_else(|| non_empty(runtime.token()))
        .unwrap_or_default()
}

/// Resolve the default DM channel from runtime settings.
pub fn resolve_dm_channel(runtime: &dyn AgentRuntime) -> Option<String> {
    non_empty(runtime.setting(DM_CHANNEL_SETTING))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Runtime assembled from configuration values.
pub struct StaticRuntime {
    agent_id: String,
    settings: HashMap<String, String>,
    token: Option<String>,
    memory: Arc<dyn MemoryStore>,
}

impl std::fmt::Debug for StaticRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticRuntime")
            .field("agent_id", &self.agent_id)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl StaticRuntime {
    /// Create a runtime with no settings.
    pub fn new(agent_id: impl Into<String>, memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            agent_id: agent_id.into(),
            settings: HashMap::new(),
            token: None,
            memory,
        }
    }

    /// Add a setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Set the fallback token field.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl AgentRuntime for StaticRuntime {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).cloned()
    }

    fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn memory(&self) -> Arc<dyn MemoryStore> {
        Arc::clone(&self.memory)
    }
}
