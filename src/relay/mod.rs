//! Channel poller/relay.
//!
//! [`RelayManager`] keeps one [`RoomState`] per [`RoomKey`]: the default
//! direct-message room plus one room per agent that was assigned a channel.
//! Each room with a channel runs a poller task on a fixed period that fetches
//! messages newer than the room's cursor and fans them out to the handlers
//! registered for that room. Outbound messages go through
//! [`RelayManager::send_message`], which records them in the agent's memory
//! store.
//!
//! Background polling never fails: errors are logged and the next tick
//! retries. Foreground sends return their errors to the caller.

pub mod handlers;
pub mod room;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::memory::{MemoryError, MemoryRecord};
use crate::platform::client::RestClient;
use crate::platform::{MessageApi, OutboundContent, PlatformError};
use crate::runtime::{resolve_dm_channel, resolve_token, AgentRuntime};

use self::handlers::{HandlerId, HandlerSet, MessageHandler};
pub use self::room::{RoomKey, RoomState};

/// Messages requested when seeding the cursor of a newly assigned channel.
const SEED_FETCH_LIMIT: u32 = 1;

/// Per-room gate; identity distinguishes a room from its replacement.
type PollGate = Arc<tokio::sync::Mutex<()>>;

/// Errors returned by foreground relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No runtime is registered for the agent, or no channel can be resolved.
    #[error("agent or channel not found: {agent_id}")]
    NotFound {
        /// The agent the operation was for.
        agent_id: String,
    },

    /// The platform request failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The memory store rejected the record.
    #[error("memory store error: {0}")]
    Memory(#[from] MemoryError),
}

/// Relay between the platform's channels and one or more agent runtimes.
pub struct RelayManager {
    api: Arc<dyn MessageApi>,
    config: RelayConfig,
    agents: RwLock<HashMap<String, Arc<dyn AgentRuntime>>>,
    rooms: Mutex<HashMap<RoomKey, RoomState>>,
    handlers: HandlerSet,
}

impl std::fmt::Debug for RelayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayManager")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl RelayManager {
    /// Build a manager for `runtime` against the REST API in `config`.
    ///
    /// The bot token comes from the runtime (see [`resolve_token`]); an empty
    /// token is accepted and surfaces later as request errors. Starts polling
    /// the direct-message room immediately, so this must run inside a Tokio
    /// runtime.
    pub fn start(runtime: Arc<dyn AgentRuntime>, config: RelayConfig) -> Arc<Self> {
        let token = resolve_token(runtime.as_ref());
        if token.is_empty() {
            warn!(agent_id = runtime.agent_id(), "no bot token configured; requests will fail");
        }
        let api: Arc<dyn MessageApi> = Arc::new(RestClient::new(config.api_base.clone(), token));
        Self::with_api(runtime, api, config)
    }

    /// Build a manager for `runtime` that talks to the platform through `api`.
    pub fn with_api(
        runtime: Arc<dyn AgentRuntime>,
        api: Arc<dyn MessageApi>,
        mut config: RelayConfig,
    ) -> Arc<Self> {
        let agent_id = runtime.agent_id().to_owned();
        if config.poll_interval.is_zero() {
            let fallback = RelayConfig::default().poll_interval;
            warn!(
                %agent_id,
                ?fallback,
                "poll interval must be non-zero; using default"
            );
            config.poll_interval = fallback;
        }
        let dm_channel =
            resolve_dm_channel(runtime.as_ref()).or_else(|| config.dm_channel_id.clone());

        let mut agents: HashMap<String, Arc<dyn AgentRuntime>> = HashMap::new();
        agents.insert(agent_id.clone(), runtime);
        let mut rooms = HashMap::new();
        rooms.insert(RoomKey::DirectMessage, RoomState::new(dm_channel.clone()));

        let manager = Arc::new(Self {
            api,
            config,
            agents: RwLock::new(agents),
            rooms: Mutex::new(rooms),
            handlers: HandlerSet::new(),
        });

        match dm_channel {
            Some(channel_id) => info!(%agent_id, %channel_id, "relay started"),
            None => warn!(%agent_id, "relay started without a DM channel; DM polling is idle"),
        }
        manager.start_polling(RoomKey::DirectMessage);
        manager
    }

    /// Acknowledge a stop request for `runtime`.
    ///
    /// Polling is torn down per agent through [`RelayManager::cleanup`] or all
    /// at once through [`RelayManager::shutdown`]; this only logs.
    pub fn stop(runtime: &dyn AgentRuntime) -> Result<(), RelayError> {
        info!(agent_id = runtime.agent_id(), "relay stop acknowledged");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    fn rooms(&self) -> MutexGuard<'_, HashMap<RoomKey, RoomState>> {
        match self.rooms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("room state lock poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }

    fn agents(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn AgentRuntime>>> {
        match self.agents.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("agent registry lock poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }

    fn agents_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn AgentRuntime>>> {
        match self.agents.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("agent registry lock poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }

    // ------------------------------------------------------------------
    // Registry and handlers
    // ------------------------------------------------------------------

    /// Register a further runtime with this manager.
    pub fn register_agent(&self, runtime: Arc<dyn AgentRuntime>) {
        let agent_id = runtime.agent_id().to_owned();
        if self.agents_mut().insert(agent_id.clone(), runtime).is_some() {
            debug!(%agent_id, "replaced registered runtime");
        } else {
            info!(%agent_id, "agent registered");
        }
    }

    /// Whether a runtime is registered for `agent_id`.
    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.agents().contains_key(agent_id)
    }

    /// Register `handler` for inbound messages in the room `scope`.
    pub fn add_message_handler(
        &self,
        scope: RoomKey,
        handler: Arc<dyn MessageHandler>,
    ) -> HandlerId {
        let id = self.handlers.add(scope.clone(), handler);
        debug!(room = %scope, ?id, "message handler added");
        id
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn remove_message_handler(&self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    /// The handler registry.
    pub fn handlers(&self) -> &HandlerSet {
        &self.handlers
    }

    // ------------------------------------------------------------------
    // Room accessors
    // ------------------------------------------------------------------

    /// Cursor of the room at `key`.
    pub fn last_message_id(&self, key: &RoomKey) -> Option<String> {
        self.rooms().get(key).and_then(|r| r.last_message_id.clone())
    }

    /// Channel bound to the room at `key`.
    pub fn channel_id(&self, key: &RoomKey) -> Option<String> {
        self.rooms().get(key).and_then(|r| r.channel_id.clone())
    }

    /// Whether the room at `key` has a running poller.
    pub fn is_polling(&self, key: &RoomKey) -> bool {
        self.rooms().get(key).is_some_and(RoomState::is_polling)
    }

    /// Whether any state exists for the room at `key`.
    pub fn has_room(&self, key: &RoomKey) -> bool {
        self.rooms().contains_key(key)
    }

    /// Number of rooms with a running poller.
    pub fn active_pollers(&self) -> usize {
        self.rooms().values().filter(|r| r.is_polling()).count()
    }

    /// Attach or clear the voice session associated with a room.
    ///
    /// Returns `false` if the room does not exist.
    pub fn set_voice_connection(&self, key: &RoomKey, connection: Option<String>) -> bool {
        match self.rooms().get_mut(key) {
            Some(room) => {
                room.voice_connection = connection;
                true
            }
            None => false,
        }
    }

    /// Voice session associated with a room.
    pub fn voice_connection(&self, key: &RoomKey) -> Option<String> {
        self.rooms().get(key).and_then(|r| r.voice_connection.clone())
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// Spawn the poller for `key` and install it on the room.
    ///
    /// The task holds only a weak reference, so dropping the manager stops it.
    fn start_polling(self: &Arc<Self>, key: RoomKey) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.poll_interval;
        let task_key = key.clone();

        let handle: JoinHandle<()> = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick(period), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    debug!(room = %task_key, "relay dropped, poller exiting");
                    break;
                };
                manager.poll_once(&task_key).await;
            }
        });

        match self.rooms().get_mut(&key) {
            Some(room) => room.replace_poller(handle),
            None => {
                // Room was cleaned up before the poller could be installed.
                handle.abort();
            }
        }
        debug!(room = %key, "poller started");
    }

    /// Run one fetch-and-dispatch step for the room at `key`.
    ///
    /// Skipped when the room is missing, has no channel, or a previous step is
    /// still in flight. Failures are logged and swallowed. Returns the number
    /// of messages delivered to handlers.
    pub async fn poll_once(&self, key: &RoomKey) -> usize {
        let Some(gate) = self.rooms().get(key).map(RoomState::gate) else {
            return 0;
        };
        let Ok(_in_flight) = gate.try_lock() else {
            debug!(room = %key, "previous poll still in flight, skipping tick");
            return 0;
        };

        let (channel_id, cursor) = {
            let rooms = self.rooms();
            let Some(room) = rooms.get(key).filter(|r| r.owns_gate(&gate)) else {
                return 0;
            };
            let Some(channel_id) = room.channel_id.clone() else {
                return 0;
            };
            (channel_id, room.last_message_id.clone())
        };

        let batch = match self
            .api
            .fetch_messages(&channel_id, self.config.fetch_limit, cursor.as_deref())
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(room = %key, %channel_id, error = %e, "failed to fetch messages");
                return 0;
            }
        };

        let Some(newest) = batch.first() else {
            return 0;
        };
        {
            let mut rooms = self.rooms();
            match rooms.get_mut(key).filter(|r| r.owns_gate(&gate)) {
                Some(room) => room.advance_cursor(&newest.id),
                None => {
                    debug!(room = %key, "room replaced during poll, dropping batch");
                    return 0;
                }
            }
        }

        debug!(room = %key, %channel_id, count = batch.len(), "dispatching messages");
        handlers::dispatch(&self.handlers, key, batch).await
    }

    // ------------------------------------------------------------------
    // Foreground operations
    // ------------------------------------------------------------------

    /// Point `agent_id`'s room at `channel_id` and start polling it.
    ///
    /// Any previous poller for the agent is cancelled first. The cursor is
    /// seeded from the channel's most recent message so history is not
    /// replayed; a failed seed fetch is logged and polling starts anyway.
    pub async fn set_active_channel(self: &Arc<Self>, agent_id: &str, channel_id: &str) {
        let key = RoomKey::agent(agent_id);
        let gate = {
            let mut rooms = self.rooms();
            if let Some(mut previous) = rooms.remove(&key) {
                previous.cancel_poller();
            }
            let room = RoomState::new(Some(channel_id.to_owned()));
            let gate = room.gate();
            rooms.insert(key.clone(), room);
            gate
        };
        info!(agent_id, channel_id, "active channel set");

        match self
            .api
            .fetch_messages(channel_id, SEED_FETCH_LIMIT, None)
            .await
        {
            Ok(messages) => {
                if let Some(latest) = messages.first() {
                    let mut rooms = self.rooms();
                    if let Some(room) = rooms.get_mut(&key).filter(|r| r.owns_gate(&gate)) {
                        room.advance_cursor(&latest.id);
                    }
                }
            }
            Err(e) => {
                error!(agent_id, channel_id, error = %e, "failed to seed channel cursor");
            }
        }

        let current = self.rooms().get(&key).is_some_and(|r| r.owns_gate(&gate));
        if current {
            self.start_polling(key);
        } else {
            debug!(agent_id, channel_id, "room replaced during seed, not starting poller");
        }
    }

    /// Send `content` on behalf of `agent_id` and record it in the agent's memory.
    ///
    /// The target is the agent's active channel, falling back to the
    /// direct-message channel. On success the room's cursor moves to the sent
    /// message and the stored record is returned.
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotFound`] if the agent has no runtime or no channel
    ///   resolves; no request is made.
    /// - [`RelayError::Platform`] if the post fails.
    /// - [`RelayError::Memory`] if the record cannot be stored.
    pub async fn send_message(
        &self,
        agent_id: &str,
        content: OutboundContent,
    ) -> Result<MemoryRecord, RelayError> {
        let not_found = || RelayError::NotFound {
            agent_id: agent_id.to_owned(),
        };

        let runtime = self.agents().get(agent_id).cloned().ok_or_else(not_found)?;
        let (room_key, channel_id, gate) = self.resolve_target(agent_id).ok_or_else(not_found)?;

        let sent = self
            .api
            .send_message(&channel_id, &content)
            .await
            .map_err(|e| {
                error!(agent_id, %channel_id, error = %e, "failed to send message");
                e
            })?;

        let record = MemoryRecord::outbound(agent_id, &channel_id, &sent, &content);
        runtime
            .memory()
            .create_memory(record.clone())
            .await
            .map_err(|e| {
                error!(agent_id, message_id = %sent.id, error = %e, "failed to record sent message");
                e
            })?;

        match self.rooms().get_mut(&room_key).filter(|r| r.owns_gate(&gate)) {
            Some(room) => room.advance_cursor(&sent.id),
            None => debug!(room = %room_key, "room replaced during send, cursor untouched"),
        }
        debug!(agent_id, %channel_id, message_id = %sent.id, "message relayed");
        Ok(record)
    }

    /// Room and channel a send for `agent_id` goes to.
    fn resolve_target(&self, agent_id: &str) -> Option<(RoomKey, String, PollGate)> {
        let rooms = self.rooms();
        let agent_key = RoomKey::agent(agent_id);
        [agent_key, RoomKey::DirectMessage]
            .into_iter()
            .find_map(|key| {
                let room = rooms.get(&key)?;
                let channel = room.channel_id.clone()?;
                Some((key, channel, room.gate()))
            })
    }

    /// Tear down everything held for `agent_id`.
    ///
    /// Cancels the agent's poller, drops its room and registry entry, and
    /// removes handlers scoped to its room. Other rooms are untouched.
    pub fn cleanup(&self, agent_id: &str) {
        let key = RoomKey::agent(agent_id);
        if let Some(mut room) = self.rooms().remove(&key) {
            room.cancel_poller();
        }
        self.agents_mut().remove(agent_id);
        let removed = self.handlers.clear_scope(&key);
        info!(agent_id, handlers_removed = removed, "agent cleaned up");
    }

    /// Abort every poller. Room state and registrations are kept.
    pub fn shutdown(&self) {
        let mut rooms = self.rooms();
        for room in rooms.values_mut() {
            room.cancel_poller();
        }
        info!(rooms = rooms.len(), "relay pollers stopped");
    }
}

/// Deadline of a poller's first tick: one `period` from now.
///
/// Falls back to an immediate tick if the deadline overflows the clock.
fn first_tick(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period).unwrap_or(now)
}
