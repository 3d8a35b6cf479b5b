//! Recording in-process `MessageApi` plus helpers shared by relay tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use discord_relay::config::RelayConfig;
use discord_relay::memory::InMemoryStore;
use discord_relay::platform::{
    Author, MessageApi, OutboundContent, PlatformError, PlatformMessage,
};
use discord_relay::relay::handlers::{FnHandler, InboundMessage, MessageHandler};
use discord_relay::relay::RelayManager;
use discord_relay::runtime::StaticRuntime;

pub const AGENT: &str = "agent-1";
pub const DM_CHANNEL: &str = "dm-chan";
pub const POLL: Duration = Duration::from_millis(2000);

/// One recorded `fetch_messages` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub channel_id: String,
    pub limit: u32,
    pub after: Option<String>,
}

#[derive(Default)]
pub struct FakeApi {
    batches: Mutex<HashMap<String, VecDeque<Vec<PlatformMessage>>>>,
    fetches: Mutex<Vec<FetchCall>>,
    sends: Mutex<Vec<(String, OutboundContent)>>,
    fail_fetch: AtomicBool,
    fail_send: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
    send_delay: Mutex<Option<Duration>>,
    next_id: AtomicU64,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        let api = Self::default();
        api.next_id.store(9000, Ordering::SeqCst);
        Arc::new(api)
    }

    /// Queue a newest-first batch returned by the next fetch on `channel_id`.
    pub fn push_batch(&self, channel_id: &str, batch: Vec<PlatformMessage>) {
        self.batches
            .lock()
            .expect("batches lock")
            .entry(channel_id.to_owned())
            .or_default()
            .push_back(batch);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn fetches(&self) -> Vec<FetchCall> {
        self.fetches.lock().expect("fetches lock").clone()
    }

    pub fn fetches_for(&self, channel_id: &str) -> Vec<FetchCall> {
        self.fetches()
            .into_iter()
            .filter(|c| c.channel_id == channel_id)
            .collect()
    }

    pub fn sends(&self) -> Vec<(String, OutboundContent)> {
        self.sends.lock().expect("sends lock").clone()
    }
}

#[async_trait]
impl MessageApi for FakeApi {
    async fn fetch_messages(
        &self,
        channel_id: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        self.fetches.lock().expect("fetches lock").push(FetchCall {
            channel_id: channel_id.to_owned(),
            limit,
            after: after.map(str::to_owned),
        });

        let delay = *self.fetch_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(PlatformError::Api {
                status: 500,
                body: "boom".to_owned(),
            });
        }
        let batch = self
            .batches
            .lock()
            .expect("batches lock")
            .get_mut(channel_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        Ok(batch)
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &OutboundContent,
    ) -> Result<PlatformMessage, PlatformError> {
        self.sends
            .lock()
            .expect("sends lock")
            .push((channel_id.to_owned(), content.clone()));

        let delay = *self.send_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_send.load(Ordering::SeqCst) {
            return Err(PlatformError::Api {
                status: 403,
                body: "missing access".to_owned(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut sent = message(&id.to_string(), true);
        sent.channel_id = channel_id.to_owned();
        sent.content = content.text.clone();
        sent.timestamp = Some("2024-05-01T12:00:00+00:00".to_owned());
        Ok(sent)
    }
}

/// A platform message with the given id and author bot flag.
pub fn message(id: &str, bot: bool) -> PlatformMessage {
    PlatformMessage {
        id: id.to_owned(),
        channel_id: String::new(),
        content: format!("message {id}"),
        timestamp: None,
        author: Author {
            id: if bot { "bot-user" } else { "human-user" }.to_owned(),
            username: if bot { "somebot" } else { "someone" }.to_owned(),
            bot,
        },
        message_reference: None,
    }
}

pub fn relay_config(dm_channel: Option<&str>) -> RelayConfig {
    RelayConfig {
        dm_channel_id: dm_channel.map(str::to_owned),
        poll_interval: POLL,
        ..RelayConfig::default()
    }
}

/// Manager for [`AGENT`] over `api`, plus the agent's memory store.
pub fn relay_with(
    api: &Arc<FakeApi>,
    dm_channel: Option<&str>,
) -> (Arc<RelayManager>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let runtime = Arc::new(StaticRuntime::new(AGENT, store.clone()));
    let api: Arc<dyn MessageApi> = api.clone();
    let relay = RelayManager::with_api(runtime, api, relay_config(dm_channel));
    (relay, store)
}

/// Handler that records delivered message ids into `seen`, tagged with `name`.
pub fn recorder(name: &'static str, seen: &Arc<Mutex<Vec<String>>>) -> Arc<dyn MessageHandler> {
    let seen = Arc::clone(seen);
    Arc::new(FnHandler::new(move |inbound: &InboundMessage| {
        seen.lock()
            .expect("seen lock")
            .push(format!("{name}:{}", inbound.message.id));
        Ok(())
    }))
}

/// Handler that always fails after recording the attempt.
pub fn failing(seen: &Arc<Mutex<Vec<String>>>) -> Arc<dyn MessageHandler> {
    let seen = Arc::clone(seen);
    Arc::new(FnHandler::new(move |inbound: &InboundMessage| {
        seen.lock()
            .expect("seen lock")
            .push(format!("failing:{}", inbound.message.id));
        anyhow::bail!("handler exploded")
    }))
}

pub fn seen(seen: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    seen.lock().expect("seen lock").clone()
}
