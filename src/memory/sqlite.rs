//! SQLite-backed [`MemoryStore`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{info, trace};
use uuid::Uuid;

use super::{MemoryContent, MemoryError, MemoryRecord, MemoryStore};

/// Schema applied on open. Every statement is idempotent.
const SCHEMA: &str = include_str!("../../migrations/001_memories.sql");

/// Maximum pool size. SQLite serializes writers anyway.
const MAX_CONNECTIONS: u32 = 4;

/// Memory store persisting records into a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteMemoryStore {
    db: SqlitePool,
}

impl SqliteMemoryStore {
    /// Open (creating if missing) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] if the file cannot be opened or the
    /// schema fails to apply.
    pub async fn open(path: &Path) -> Result<Self, MemoryError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(opts)
            .await?;
        let store = Self::from_pool(db).await?;
        info!(path = %path.display(), "memory database opened");
        Ok(store)
    }

    /// Wrap an existing pool, applying the schema.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] if the schema fails to apply.
    pub async fn from_pool(db: SqlitePool) -> Result<Self, MemoryError> {
        sqlx::raw_sql(SCHEMA).execute(&db).await?;
        Ok(Self { db })
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<i64, MemoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// All records for `room_id`, oldest first.
    pub async fn memories_for_room(&self, room_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = sqlx::query(
            "SELECT id, agent_id, user_id, room_id, text, source, in_reply_to, created_at \
             FROM memories WHERE room_id = ?1 ORDER BY created_at ASC",
        )
        .bind(room_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &SqliteRow) -> Result<MemoryRecord, MemoryError> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;

    let id = Uuid::parse_str(&id).map_err(|_| MemoryError::InvalidValue {
        field: "id",
        value: id.clone(),
    })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|_| MemoryError::InvalidValue {
            field: "created_at",
            value: created_at.clone(),
        })?
        .with_timezone(&Utc);

    Ok(MemoryRecord {
        id,
        agent_id: row.try_get("agent_id")?,
        user_id: row.try_get("user_id")?,
        room_id: row.try_get("room_id")?,
        content: MemoryContent {
            text: row.try_get("text")?,
            source: row.try_get("source")?,
            in_reply_to: row.try_get("in_reply_to")?,
        },
        created_at,
    })
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn create_memory(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        // Re-recording the same platform message replaces the row.
        sqlx::query(
            "INSERT OR REPLACE INTO memories \
             (id, agent_id, user_id, room_id, text, source, in_reply_to, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(record.id.to_string())
        .bind(&record.agent_id)
        .bind(&record.user_id)
        .bind(&record.room_id)
        .bind(&record.content.text)
        .bind(&record.content.source)
        .bind(&record.content.in_reply_to)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.db)
        .await?;
        trace!(id = %record.id, room_id = %record.room_id, "memory persisted");
        Ok(())
    }
}
