//! Tests for switching an agent's active channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use discord_relay::relay::RoomKey;

use crate::fake_api::{message, recorder, relay_with, seen, FakeApi, AGENT, POLL};

#[tokio::test(start_paused = true)]
async fn switch_seeds_cursor_from_latest_message() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, None);
    api.push_batch("general", vec![message("300", false)]);

    relay.set_active_channel(AGENT, "general").await;

    let key = RoomKey::agent(AGENT);
    assert_eq!(relay.channel_id(&key).as_deref(), Some("general"));
    assert_eq!(relay.last_message_id(&key).as_deref(), Some("300"));
    let seed = &api.fetches_for("general")[0];
    assert_eq!(seed.limit, 1);
    assert_eq!(seed.after, None);
    assert!(relay.is_polling(&key));
}

#[tokio::test(start_paused = true)]
async fn seeded_history_is_not_replayed() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, None);
    let log = Arc::new(Mutex::new(Vec::new()));
    let key = RoomKey::agent(AGENT);
    relay.add_message_handler(key.clone(), recorder("agent", &log));

    api.push_batch("general", vec![message("300", false)]);
    relay.set_active_channel(AGENT, "general").await;
    api.push_batch("general", vec![message("301", false)]);
    tokio::time::sleep(POLL + Duration::from_millis(50)).await;

    assert_eq!(seen(&log), vec!["agent:301"]);
    let fetches = api.fetches_for("general");
    assert_eq!(fetches[1].after.as_deref(), Some("300"));
}

#[tokio::test(start_paused = true)]
async fn switch_replaces_previous_poller() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, None);

    relay.set_active_channel(AGENT, "first").await;
    relay.set_active_channel(AGENT, "second").await;
    // DM room plus exactly one agent room.
    assert_eq!(relay.active_pollers(), 2);

    tokio::time::sleep(POLL * 3 + Duration::from_millis(50)).await;

    // Only the seed fetch ever hit the first channel.
    assert_eq!(api.fetches_for("first").len(), 1);
    assert_eq!(api.fetches_for("second").len(), 4);
    assert_eq!(relay.channel_id(&RoomKey::agent(AGENT)).as_deref(), Some("second"));
}

#[tokio::test(start_paused = true)]
async fn switch_resets_cursor() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, None);
    let key = RoomKey::agent(AGENT);

    api.push_batch("first", vec![message("900", false)]);
    relay.set_active_channel(AGENT, "first").await;
    relay.set_active_channel(AGENT, "second").await;

    assert_eq!(relay.last_message_id(&key), None);
}

#[tokio::test(start_paused = true)]
async fn failed_seed_still_starts_polling() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, None);
    let key = RoomKey::agent(AGENT);

    api.fail_fetches(true);
    relay.set_active_channel(AGENT, "general").await;
    assert!(relay.is_polling(&key));
    assert_eq!(relay.last_message_id(&key), None);

    api.fail_fetches(false);
    api.push_batch("general", vec![message("42", false)]);
    tokio::time::sleep(POLL + Duration::from_millis(50)).await;
    assert_eq!(relay.last_message_id(&key).as_deref(), Some("42"));
}

#[tokio::test(start_paused = true)]
async fn handlers_only_see_their_own_room() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, Some("dm-chan"));
    let log = Arc::new(Mutex::new(Vec::new()));
    relay.add_message_handler(RoomKey::DirectMessage, recorder("dm", &log));
    relay.add_message_handler(RoomKey::agent(AGENT), recorder("agent", &log));

    relay.set_active_channel(AGENT, "general").await;
    api.push_batch("dm-chan", vec![message("1", false)]);
    api.push_batch("general", vec![message("2", false)]);

    relay.poll_once(&RoomKey::DirectMessage).await;
    relay.poll_once(&RoomKey::agent(AGENT)).await;

    assert_eq!(seen(&log), vec!["dm:1", "agent:2"]);
}

#[tokio::test(start_paused = true)]
async fn voice_connection_is_kept_on_room() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, None);
    let key = RoomKey::agent(AGENT);

    assert!(!relay.set_voice_connection(&key, Some("vc-1".to_owned())));
    relay.set_active_channel(AGENT, "general").await;
    assert!(relay.set_voice_connection(&key, Some("vc-1".to_owned())));
    assert_eq!(relay.voice_connection(&key).as_deref(), Some("vc-1"));
}

#[tokio::test(start_paused = true)]
async fn overlapping_switches_seed_only_their_own_room() {
    let api = FakeApi::new();
    let (relay, _store) = relay_with(&api, None);
    let key = RoomKey::agent(AGENT);
    api.set_fetch_delay(Duration::from_millis(100));
    api.push_batch("general", vec![message("700", false)]);

    // The earlier switch's seed returns "700" after the later switch has
    // already installed its own room; the later seed comes back empty.
    tokio::join!(relay.set_active_channel(AGENT, "general"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        relay.set_active_channel(AGENT, "general").await;
    });

    assert_eq!(relay.last_message_id(&key), None);
    assert!(relay.is_polling(&key));
}
