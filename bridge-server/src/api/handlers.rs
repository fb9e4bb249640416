//! Handlers for each endpoint in §6's inbound HTTP table.

use crate::error::{Error, Result};
use crate::ingest;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use bridge_common::models::DeckSample;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "bridge-server",
        "version": env!("CARGO_PKG_VERSION"),
        "listen": state.listen_addr,
    }))
}

/// POST /api/deck/update
pub async fn deck_update(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<StatusCode> {
    if body.len() > 4096 {
        return Err(Error::InvalidInput("deck sample body exceeds 4 KB".into()));
    }
    let sample: DeckSample =
        serde_json::from_slice(&body).map_err(|e| Error::InvalidInput(format!("malformed deck sample: {}", e)))?;
    ingest::accept_sample(&state, sample).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ForceVideoRequest {
    pub path: String,
}

/// POST /api/force-video
pub async fn force_video(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForceVideoRequest>,
) -> Result<StatusCode> {
    ingest::force_video(&state, &req.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ForceDeckVideoRequest {
    pub path: String,
    pub deck: i32,
}

/// POST /api/force-deck-video
pub async fn force_deck_video(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForceDeckVideoRequest>,
) -> Result<StatusCode> {
    ingest::force_deck_video(&state, req.deck, &req.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct VideoEndedRequest {
    pub deck: i32,
    #[serde(rename = "matchLevel")]
    pub match_level: u8,
    #[serde(rename = "currentVideo")]
    pub current_video: String,
}

/// POST /api/deck/video-ended
pub async fn video_ended(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VideoEndedRequest>,
) -> Result<Json<ingest::VideoEndedOutcome>> {
    let outcome = ingest::video_ended(&state, req.deck, req.match_level, &req.current_video).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct VideoListEntry {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

/// GET /api/videos[?type=transition]
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<VideoListEntry>> {
    let index = match params.get("type").map(|s| s.as_str()) {
        Some("transition") => &state.transitions,
        _ => &state.songs,
    };
    let entries = index
        .list()
        .await
        .into_iter()
        .map(|v| VideoListEntry {
            name: v.name,
            path: v.path,
            bpm: (v.bpm > 0.0).then_some(v.bpm),
        })
        .collect();
    Json(entries)
}

/// GET /api/config
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<HashMap<String, String>> {
    Json(state.config.all().await)
}

#[derive(Debug, Deserialize)]
pub struct SetConfigRequest {
    pub key: String,
    pub value: String,
}

/// POST /api/config
pub async fn set_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetConfigRequest>,
) -> Result<StatusCode> {
    state.config.set(&req.key, &req.value).await?;
    state
        .events
        .publish(bridge_common::events::EventPayload::ConfigUpdated {
            key: req.key,
            value: req.value,
        })
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/shutdown
pub async fn shutdown(State(state): State<Arc<AppState>>) -> StatusCode {
    info!("shutdown requested via API");
    state.shutdown.notify_one();
    StatusCode::NO_CONTENT
}
