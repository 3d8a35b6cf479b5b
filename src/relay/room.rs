//! Per-room polling state.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

/// Key identifying a logical room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomKey {
    /// The default direct-message room.
    DirectMessage,
    /// The channel currently assigned to an agent.
    Agent(String),
}

impl RoomKey {
    /// Room key for `agent_id`.
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self::Agent(agent_id.into())
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectMessage => f.write_str("dm"),
            Self::Agent(id) => f.write_str(id),
        }
    }
}

/// State tracked for one room.
///
/// Dropping the state aborts its poller task.
#[derive(Debug)]
pub struct RoomState {
    /// Remote channel identifier. Polls are skipped while unset.
    pub channel_id: Option<String>,
    /// Most recently observed message id.
    pub last_message_id: Option<String>,
    /// Voice session associated with the room. Not used by polling.
    pub voice_connection: Option<String>,
    poller: Option<JoinHandle<()>>,
    /// Held for the duration of one fetch-and-dispatch step.
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl RoomState {
    /// Fresh room bound to `channel_id`, with no cursor and no poller.
    pub fn new(channel_id: Option<String>) -> Self {
        Self {
            channel_id,
            last_message_id: None,
            voice_connection: None,
            poller: None,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Whether a poller task is installed and still running.
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Install `handle` as the room's poller, aborting any previous one.
    pub(crate) fn replace_poller(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.poller.replace(handle) {
            previous.abort();
        }
    }

    /// Abort the poller, if any.
    pub(crate) fn cancel_poller(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }

    pub(crate) fn gate(&self) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.gate)
    }

    /// Whether `gate` belongs to this room instance.
    ///
    /// A channel switch replaces the room, so a step that started against the
    /// old instance must not write into the new one.
    pub(crate) fn owns_gate(&self, gate: &Arc<tokio::sync::Mutex<()>>) -> bool {
        Arc::ptr_eq(&self.gate, gate)
    }

    /// Move the cursor to `message_id` unless that would move it backwards.
    ///
    /// Snowflake ids compare numerically. Non-numeric ids always replace the cursor.
    pub fn advance_cursor(&mut self, message_id: &str) {
        let newer = match (self.last_message_id.as_deref(), message_id.parse::<u64>()) {
            (Some(current), Ok(candidate)) => match current.parse::<u64>() {
                Ok(current) => candidate > current,
                Err(_) => true,
            },
            _ => true,
        };
        if newer {
            self.last_message_id = Some(message_id.to_owned());
        }
    }
}

impl Drop for RoomState {
    fn drop(&mut self) {
        self.cancel_poller();
    }
}
