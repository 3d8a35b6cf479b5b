//! Memory records for messages the agent sends, and the stores that persist them.
//!
//! A [`MemoryRecord`] is built for every outbound message and handed to the
//! runtime's [`MemoryStore`]. Two stores ship with the crate:
//! - [`InMemoryStore`] — process-local, used in tests and when no database is configured
//! - [`sqlite::SqliteMemoryStore`] — SQLite persistence through `sqlx`

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::platform::{OutboundContent, PlatformMessage};

/// Source tag written into every record.
pub const SOURCE: &str = "discord";

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Content portion of a memory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryContent {
    /// Message text.
    pub text: String,
    /// Platform the message went out on.
    pub source: String,
    /// Platform id of the message this one replied to.
    pub in_reply_to: Option<String>,
}

/// Persisted representation of a message exchanged with an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Deterministic id, see [`record_id`].
    pub id: Uuid,
    /// Agent the memory belongs to.
    pub agent_id: String,
    /// Author of the message. For outbound messages this is the agent itself.
    pub user_id: String,
    /// Channel the message was exchanged in.
    pub room_id: String,
    /// Message content.
    pub content: MemoryContent,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build the record for a message `agent_id` just sent into `room_id`.
    ///
    /// `sent` is the platform's echo of the created message and `requested`
    /// what the agent asked to send; the echo wins when it carries text. The
    /// creation time is the platform timestamp when it parses as RFC 3339,
    /// otherwise the current time.
    pub fn outbound(
        agent_id: &str,
        room_id: &str,
        sent: &PlatformMessage,
        requested: &OutboundContent,
    ) -> Self {
        let created_at = sent
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let text = if sent.content.is_empty() {
            requested.text.clone()
        } else {
            sent.content.clone()
        };

        Self {
            id: record_id(&sent.id, agent_id),
            agent_id: agent_id.to_owned(),
            user_id: agent_id.to_owned(),
            room_id: room_id.to_owned(),
            content: MemoryContent {
                text,
                source: SOURCE.to_owned(),
                in_reply_to: requested.in_reply_to.clone(),
            },
            created_at,
        }
    }
}

/// Derive the record id for platform message `message_id` sent by `agent_id`.
///
/// UUID v5 (OID namespace) over `"{message_id}-{agent_id}"`.
pub fn record_id(message_id: &str, agent_id: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{message_id}-{agent_id}").as_bytes(),
    )
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from memory store operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded.
    #[error("invalid {field} value: {value:?}")]
    InvalidValue {
        /// Which column contained the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Persistence for memory records, owned by the agent runtime.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist `record`.
    async fn create_memory(&self, record: MemoryRecord) -> Result<(), MemoryError>;
}

/// Process-local store backed by a vector.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in insertion order.
    pub async fn records(&self) -> Vec<MemoryRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn create_memory(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        trace!(id = %record.id, room_id = %record.room_id, "memory recorded");
        self.records.write().await.push(record);
        Ok(())
    }
}
