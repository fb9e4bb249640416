//! SSE replay-then-live behaviour (§4.7), driven over a real socket since
//! `tower::ServiceExt::oneshot` can't stream a long-lived response body.

use bridge_server::api::server::build_router;
use bridge_server::db::{self, BpmCache, ConfigStore};
use bridge_server::library::LibraryIndex;
use bridge_server::state::AppState;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_test_server() -> (String, Arc<AppState>) {
    let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
    db::init::init_schema(&pool).await.unwrap();
    let config = ConfigStore::load(pool.clone()).await.unwrap();

    let song_dir = tempfile::tempdir().unwrap();
    let transition_dir = tempfile::tempdir().unwrap();
    let songs = LibraryIndex::new(song_dir.keep(), "/videos/song", BpmCache::new(pool.clone()));
    let transitions = LibraryIndex::new(transition_dir.keep(), "/videos/transition", BpmCache::new(pool.clone()));

    let state = Arc::new(AppState::new(songs, transitions, config, pool));
    let router = build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

#[tokio::test]
async fn late_joiner_sees_replayed_deck_update_then_live_events() {
    let (base, state) = spawn_test_server().await;

    let client = reqwest::Client::new();
    client
        .post(format!("{}/api/deck/update", base))
        .json(&json!({ "deck": 1, "isAudible": true, "isPlaying": true, "filename": "a.mp4", "pitch": 100.0 }))
        .send()
        .await
        .unwrap();

    // Give the publish a moment to land in the replay cache.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut stream = client.get(format!("{}/events", base)).send().await.unwrap();
    assert!(stream.status().is_success());

    state
        .config
        .set("loop_video_enabled", "true")
        .await
        .unwrap();
    state
        .events
        .publish(bridge_common::events::EventPayload::ConfigUpdated {
            key: "loop_video_enabled".into(),
            value: "true".into(),
        })
        .await;

    let mut seen_replay_deck_update = false;
    let mut seen_live_config_update = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);

    while tokio::time::Instant::now() < deadline && !(seen_replay_deck_update && seen_live_config_update) {
        match tokio::time::timeout(Duration::from_millis(500), stream.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                let text = String::from_utf8_lossy(&chunk);
                if text.contains("event: deck-update") {
                    seen_replay_deck_update = true;
                }
                if text.contains("event: config-updated") {
                    seen_live_config_update = true;
                }
            }
            _ => break,
        }
    }

    assert!(seen_replay_deck_update, "expected the deck-update replay on connect");
    assert!(seen_live_config_update, "expected the live config-updated event");
}
