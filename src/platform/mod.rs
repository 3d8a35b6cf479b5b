//! Discord-style REST platform: wire types, errors, and the [`MessageApi`] seam.
//!
//! The relay never talks to `reqwest` directly. Everything goes through
//! [`MessageApi`], implemented for production by [`client::RestClient`].

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message object as returned by the platform.
///
/// Only the fields the relay consumes are modelled; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMessage {
    /// Platform-assigned message identifier (snowflake).
    pub id: String,
    /// Channel the message belongs to.
    #[serde(default)]
    pub channel_id: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// ISO 8601 creation timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Message author.
    pub author: Author,
    /// Reply reference, if this message answers another one.
    #[serde(default)]
    pub message_reference: Option<MessageReference>,
}

/// The author of a platform message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// User identifier.
    pub id: String,
    /// Display username.
    #[serde(default)]
    pub username: String,
    /// Whether the account is a bot. Absent means a human account.
    #[serde(default)]
    pub bot: bool,
}

/// Reference to another message (used for replies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    /// Referenced message identifier.
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Outbound message content handed to [`MessageApi::send_message`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundContent {
    /// Message text.
    pub text: String,
    /// Identifier of the message being replied to.
    pub in_reply_to: Option<String>,
}

impl OutboundContent {
    /// Plain text message with no reply target.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            in_reply_to: None,
        }
    }

    /// Text message replying to `message_id`.
    pub fn reply(text: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            in_reply_to: Some(message_id.into()),
        }
    }
}

/// Errors from the platform REST API.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// HTTP transport failed (connect, timeout, TLS...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("platform API error {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read/write access to channel messages on the platform.
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Fetch up to `limit` recent messages in `channel_id`, newest first.
    ///
    /// When `after` is set only messages newer than that id are returned.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Vec<PlatformMessage>, PlatformError>;

    /// Post a message to `channel_id` and return the created message.
    async fn send_message(
        &self,
        channel_id: &str,
        content: &OutboundContent,
    ) -> Result<PlatformMessage, PlatformError>;
}
