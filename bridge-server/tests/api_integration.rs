//! Integration tests for the HTTP/SSE surface (§6).
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`, mirroring
//! the teacher's `api_integration.rs` pattern, except for the SSE replay
//! test which needs a live connection and uses a bound `TcpListener` with
//! `reqwest` instead.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bridge_server::api::server::build_router;
use bridge_server::db::{self, BpmCache, ConfigStore};
use bridge_server::library::LibraryIndex;
use bridge_server::state::AppState;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

async fn test_state() -> (Arc<AppState>, tempfile::TempDir, tempfile::TempDir) {
    let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
    db::init::init_schema(&pool).await.unwrap();
    let config = ConfigStore::load(pool.clone()).await.unwrap();

    let song_dir = tempfile::tempdir().unwrap();
    let transition_dir = tempfile::tempdir().unwrap();
    std::fs::write(song_dir.path().join("track_120bpm.mp4"), b"fake").unwrap();
    std::fs::write(transition_dir.path().join("wipe_100bpm.mp4"), b"fake").unwrap();

    let songs = LibraryIndex::new(song_dir.path().to_path_buf(), "/videos/song", BpmCache::new(pool.clone()));
    let transitions =
        LibraryIndex::new(transition_dir.path().to_path_buf(), "/videos/transition", BpmCache::new(pool.clone()));
    songs.scan().await.unwrap();
    transitions.scan().await.unwrap();

    let state = Arc::new(AppState::new(songs, transitions, config, pool));
    (state, song_dir, transition_dir)
}

async fn request(app: axum::Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Option<Value>) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { None } else { Some(serde_json::from_slice(&bytes).unwrap()) };
    (status, json)
}

#[tokio::test]
async fn health_reports_ok() {
    let (state, _s, _t) = test_state().await;
    let (status, body) = request(build_router(state), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "bridge-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn deck_update_matches_a_known_video_and_elects_master() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(Arc::clone(&state));

    let (status, _) = request(
        app,
        "POST",
        "/api/deck/update",
        Some(json!({
            "deck": 1,
            "isAudible": true,
            "isPlaying": true,
            "volume": 0.8,
            "filename": "track_120bpm.mp4",
            "bpm": 120.0,
            "pitch": 100.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(state.master.current_master().await, 1);
}

#[tokio::test]
async fn deck_update_rejects_oversized_body() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(state);
    let huge = "x".repeat(5000);
    let (status, _) =
        request(app, "POST", "/api/deck/update", Some(json!({ "deck": 1, "filename": huge }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn force_video_without_a_master_is_a_conflict() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(state);
    let (status, _) =
        request(app, "POST", "/api/force-video", Some(json!({ "path": "/videos/song/track_120bpm.mp4" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn force_deck_video_requires_a_known_sample_first() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(Arc::clone(&state));
    let (status, _) = request(
        app,
        "POST",
        "/api/force-deck-video",
        Some(json!({ "deck": 1, "path": "/videos/song/track_120bpm.mp4" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn force_deck_video_after_a_sample_switches_that_deck() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(Arc::clone(&state));
    request(
        app.clone(),
        "POST",
        "/api/deck/update",
        Some(json!({ "deck": 1, "isAudible": true, "isPlaying": true, "filename": "track_120bpm.mp4", "pitch": 100.0 })),
    )
    .await;

    let (status, _) = request(
        app,
        "POST",
        "/api/force-deck-video",
        Some(json!({ "deck": 1, "path": "/videos/song/track_120bpm.mp4" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(state.forced_override(1).await.unwrap().bound_filename, "track_120bpm.mp4");
}

#[tokio::test]
async fn list_videos_separates_song_and_transition_libraries() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(Arc::clone(&state));

    let (_, songs) = request(app.clone(), "GET", "/api/videos", None).await;
    let songs = songs.unwrap();
    assert_eq!(songs.as_array().unwrap().len(), 1);
    assert_eq!(songs[0]["name"], "track_120bpm.mp4");

    let (_, transitions) = request(app, "GET", "/api/videos?type=transition", None).await;
    let transitions = transitions.unwrap();
    assert_eq!(transitions.as_array().unwrap().len(), 1);
    assert_eq!(transitions[0]["name"], "wipe_100bpm.mp4");
}

#[tokio::test]
async fn config_round_trips_through_get_and_set() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(Arc::clone(&state));

    let (status, _) =
        request(app.clone(), "POST", "/api/config", Some(json!({ "key": "loop_video_enabled", "value": "true" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, all) = request(app, "GET", "/api/config", None).await;
    assert_eq!(all.unwrap()["loop_video_enabled"], "true");
}

#[tokio::test]
async fn video_ended_with_low_match_level_loops() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(state);
    let (status, body) = request(
        app,
        "POST",
        "/api/deck/video-ended",
        Some(json!({ "deck": 1, "matchLevel": 0, "currentVideo": "/videos/song/track_120bpm.mp4" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["action"], "loop");
}

#[tokio::test]
async fn video_ended_switch_binds_override_to_the_decks_current_filename() {
    let (state, song_dir, _t) = test_state().await;
    std::fs::write(song_dir.path().join("other_130bpm.mp4"), b"fake").unwrap();
    state.songs.scan().await.unwrap();
    let app = build_router(Arc::clone(&state));

    request(
        app.clone(),
        "POST",
        "/api/deck/update",
        Some(json!({ "deck": 1, "isAudible": true, "isPlaying": true, "filename": "track_120bpm.mp4", "pitch": 100.0 })),
    )
    .await;

    let (status, body) = request(
        app,
        "POST",
        "/api/deck/video-ended",
        Some(json!({ "deck": 1, "matchLevel": 4, "currentVideo": "/videos/song/track_120bpm.mp4" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["action"], "switch");

    // The override must stay bound to the filename the deck is still
    // reporting, not the new video path, or the very next ingest drops it.
    assert_eq!(state.forced_override(1).await.unwrap().bound_filename, "track_120bpm.mp4");
}

#[tokio::test]
async fn shutdown_notifies_the_app_state() {
    let (state, _s, _t) = test_state().await;
    let app = build_router(Arc::clone(&state));
    let notified = state.shutdown.notified();
    let (status, _) = request(app, "POST", "/api/shutdown", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    tokio::time::timeout(std::time::Duration::from_secs(1), notified).await.expect("shutdown was not signaled");
}
