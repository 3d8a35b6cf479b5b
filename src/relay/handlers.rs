//! Inbound message handlers and batch fan-out.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{error, trace, warn};

use super::room::RoomKey;
use crate::platform::PlatformMessage;

/// A message delivered to handlers, tagged with the room it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Room the message was polled from.
    pub room: RoomKey,
    /// The platform message.
    pub message: PlatformMessage,
}

/// Callback invoked once per qualifying inbound message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message. Errors are logged by the relay and otherwise ignored.
    async fn handle(&self, inbound: &InboundMessage) -> anyhow::Result<()>;
}

/// Adapts a synchronous closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&InboundMessage) -> anyhow::Result<()> + Send + Sync,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&InboundMessage) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, inbound: &InboundMessage) -> anyhow::Result<()> {
        (self.0)(inbound)
    }
}

/// Opaque registration handle returned by [`HandlerSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct Registration {
    scope: RoomKey,
    handler: Arc<dyn MessageHandler>,
}

/// Handlers keyed by the room they listen to.
///
/// Ids are allocated monotonically, so iteration follows registration order.
#[derive(Default)]
pub struct HandlerSet {
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<HandlerId, Registration>>,
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl HandlerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<HandlerId, Registration>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("handler set lock poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<HandlerId, Registration>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("handler set lock poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }

    /// Register `handler` for messages arriving in `scope`.
    pub fn add(&self, scope: RoomKey, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().insert(id, Registration { scope, handler });
        id
    }

    /// Remove a registration. Returns whether it existed.
    pub fn remove(&self, id: HandlerId) -> bool {
        self.write().remove(&id).is_some()
    }

    /// Remove every handler scoped to `scope`, returning how many were removed.
    pub fn clear_scope(&self, scope: &RoomKey) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, reg| &reg.scope != scope);
        before.saturating_sub(entries.len())
    }

    /// Handlers scoped to `scope`, in registration order.
    pub fn for_room(&self, scope: &RoomKey) -> Vec<Arc<dyn MessageHandler>> {
        self.read()
            .values()
            .filter(|reg| &reg.scope == scope)
            .map(|reg| Arc::clone(&reg.handler))
            .collect()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Deliver a newest-first `batch` from `room` to the room's handlers.
///
/// Messages are delivered oldest first. Bot-authored messages are skipped.
/// A failing handler is logged and does not stop the remaining handlers or
/// messages. Returns the number of messages delivered.
pub async fn dispatch(handlers: &HandlerSet, room: &RoomKey, batch: Vec<PlatformMessage>) -> usize {
    let targets = handlers.for_room(room);
    let mut delivered: usize = 0;

    for message in batch.into_iter().rev() {
        if message.author.bot {
            trace!(room = %room, message_id = %message.id, "skipping bot message");
            continue;
        }

        let inbound = InboundMessage {
            room: room.clone(),
            message,
        };
        for handler in &targets {
            if let Err(e) = handler.handle(&inbound).await {
                error!(
                    room = %room,
                    message_id = %inbound.message.id,
                    error = %e,
                    "message handler failed"
                );
            }
        }
        delivered = delivered.saturating_add(1);
    }

    delivered
}
