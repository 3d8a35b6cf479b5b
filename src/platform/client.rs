//! REST client for the platform's channel message endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::{MessageApi, OutboundContent, PlatformError, PlatformMessage};

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for normal operations.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Authenticated client bound to a single bot token.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("has_token", &!self.token.is_empty())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SendBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<ReferenceBody<'a>>,
}

#[derive(Serialize)]
struct ReferenceBody<'a> {
    message_id: &'a str,
}

impl RestClient {
    /// Create a client for `base_url` authenticating with `token`.
    ///
    /// An empty token is accepted; requests then fail with a 401 [`PlatformError::Api`].
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            client,
            base_url,
            token: token.into(),
        }
    }

    /// Client against the public API at [`DEFAULT_API_BASE`].
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(DEFAULT_API_BASE, token)
    }

    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{channel_id}/messages", self.base_url)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn read_body(resp: reqwest::Response) -> Result<String, PlatformError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PlatformError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl MessageApi for RestClient {
    async fn fetch_messages(
        &self,
        channel_id: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_owned()));
        }

        let resp = self
            .client
            .get(self.messages_url(channel_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&query)
            .send()
            .await?;
        let body = Self::read_body(resp).await?;
        let messages: Vec<PlatformMessage> = serde_json::from_str(&body)?;
        debug!(channel_id, count = messages.len(), "fetched messages");
        Ok(messages)
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &OutboundContent,
    ) -> Result<PlatformMessage, PlatformError> {
        let body = SendBody {
            content: &content.text,
            message_reference: content
                .in_reply_to
                .as_deref()
                .map(|message_id| ReferenceBody { message_id }),
        };

        let resp = self
            .client
            .post(self.messages_url(channel_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await?;
        let text = Self::read_body(resp).await?;
        let sent: PlatformMessage = serde_json::from_str(&text)?;
        debug!(channel_id, message_id = %sent.id, "message sent");
        Ok(sent)
    }
}
