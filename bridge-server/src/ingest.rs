//! Sample Ingest (§4.1).
//!
//! The orchestration point: normalises a probe sample, runs the matcher,
//! the video position tracker, the visibility timer, and master
//! election, then publishes the deck-update (preceded by any transition
//! events) in the single order §5 requires. Grounded on the teacher's
//! handler-calls-engine-then-broadcasts shape in `api/handlers.rs`.

use crate::db::content;
use crate::error::{Error, Result};
use crate::master::ActiveDeckRecord;
use crate::state::AppState;
use crate::visibility::VisibilityTimer;
use bridge_common::events::EventPayload;
use bridge_common::models::{DeckSample, MatchResult, MatchType, TransitionSlot};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of `video-ended`, mirrored into the HTTP response body.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum VideoEndedOutcome {
    Loop,
    Switch { video: String },
}

pub async fn accept_sample(state: &Arc<AppState>, sample: DeckSample) -> Result<()> {
    if state.is_analysing() {
        return Ok(());
    }

    if sample.deck < 1 {
        return Ok(());
    }

    if sample.deck > 4 {
        state.extra_decks_seen.store(true, std::sync::atomic::Ordering::Relaxed);
        return Ok(());
    }

    let deck = sample.deck;
    info!(deck, audible = sample.is_audible, playing = sample.is_playing, filename = %sample.filename, "deck sample");

    let forced = state.forced_override(deck).await;
    let match_result = match forced {
        Some(fo) if fo.bound_filename == sample.filename => Some(fo.result),
        _ => {
            state.clear_forced_override(deck).await;
            state.matcher.match_deck(&state.songs, &sample.filename, sample.bpm).await
        }
    };

    let video_elapsed_ms = if let Some(m) = &match_result {
        if m.level as u8 >= 2 {
            Some(
                state
                    .tracker
                    .update(deck, &m.video.path, sample.is_playing, sample.pitch, sample.bpm, m.video.bpm)
                    .await,
            )
        } else {
            None
        }
    } else {
        None
    };

    if VisibilityTimer::is_tracked(deck) {
        let hide_state = Arc::clone(state);
        let visibility_deck = deck;
        if let Some(visible) = state
            .visibility
            .on_sample(deck, sample.is_audible, sample.is_playing, move |d| async move {
                if let Some(visible) = hide_state.visibility.mark_hidden(d).await {
                    hide_state.events.publish(EventPayload::DeckVisibility { deck: d, visible }).await;
                }
            })
            .await
        {
            state
                .events
                .publish(EventPayload::DeckVisibility { deck: visibility_deck, visible })
                .await;
        }
    }

    let record = ActiveDeckRecord {
        audible: sample.is_audible,
        playing: sample.is_playing,
        volume: sample.volume,
        has_video: match_result.is_some(),
    };

    let transition_videos = transition_slots(state).await;
    let (in_css, out_css) = transition_effects(state).await?;
    let outcome = state.master.on_sample(deck, record, &transition_videos, &in_css, &out_css).await;

    let mut to_publish = Vec::with_capacity(3);
    if let Some(play) = outcome.play {
        to_publish.push(EventPayload::TransitionPlay {
            slot: play.slot,
            in_css: play.in_css,
            out_css: play.out_css,
        });
    }
    if let Some(pool) = outcome.pool {
        to_publish.push(EventPayload::TransitionPool { slots: pool });
    }
    to_publish.push(EventPayload::DeckUpdate {
        deck,
        sample,
        match_result,
        video_elapsed_ms,
    });
    state.events.publish_sequence(to_publish).await;

    Ok(())
}

/// Snapshot the current master's filename, install a forced override on
/// that deck, reset its video sync, trigger a transition, and publish the
/// fresh deck-update for `B.mp4` (§4.1, §8 scenario 3).
pub async fn force_video(state: &Arc<AppState>, path: &str) -> Result<()> {
    let master = state.master.current_master().await;
    if master == 0 {
        return Err(Error::Conflict("no master deck is active".into()));
    }
    force_deck_video_inner(state, master, path).await
}

pub async fn force_deck_video(state: &Arc<AppState>, deck: i32, path: &str) -> Result<()> {
    force_deck_video_inner(state, deck, path).await
}

async fn force_deck_video_inner(state: &Arc<AppState>, deck: i32, path: &str) -> Result<()> {
    let video = state
        .matcher
        .get_by_path(&state.songs, path)
        .await
        .ok_or_else(|| Error::NotFound(format!("video not in library: {}", path)))?;

    let current_sample = state
        .events
        .latest_deck_sample(deck)
        .await
        .ok_or_else(|| Error::NotFound(format!("deck {} sample not yet known", deck)))?;

    let bound_filename = current_sample.filename.clone();
    let result = MatchResult {
        video: video.clone(),
        level: bridge_common::models::MatchLevel::Bpm,
        match_type: MatchType::Forced,
        similarity: 1.0,
    };
    state.set_forced_override(deck, result.clone(), bound_filename.clone()).await;
    state.tracker.reset(deck).await;

    let is_master = state.master.current_master().await == deck;
    let mut to_publish = Vec::with_capacity(3);
    if is_master {
        let transition_videos = transition_slots(state).await;
        let (in_css, out_css) = transition_effects(state).await?;
        let outcome = state
            .master
            .on_sample(
                deck,
                ActiveDeckRecord { audible: true, playing: true, volume: 1.0, has_video: true },
                &transition_videos,
                &in_css,
                &out_css,
            )
            .await;
        if let Some(play) = outcome.play {
            to_publish.push(EventPayload::TransitionPlay { slot: play.slot, in_css: play.in_css, out_css: play.out_css });
        }
        if let Some(pool) = outcome.pool {
            to_publish.push(EventPayload::TransitionPool { slots: pool });
        }
    }

    if VisibilityTimer::is_tracked(deck) {
        state
            .events
            .publish(EventPayload::DeckVisibility { deck, visible: true })
            .await;
    }

    let mut sample = current_sample;
    sample.filename = bound_filename;
    to_publish.push(EventPayload::DeckUpdate {
        deck,
        sample,
        match_result: Some(result),
        video_elapsed_ms: Some(0),
    });
    state.events.publish_sequence(to_publish).await;

    Ok(())
}

pub async fn video_ended(state: &Arc<AppState>, deck: i32, match_level: u8, current_video: &str) -> Result<VideoEndedOutcome> {
    if match_level <= 1 {
        state.events.publish(EventPayload::TransitionPool { slots: state.master.current_pool().await }).await;
        return Ok(VideoEndedOutcome::Loop);
    }

    let next = state.matcher.random_excluding(&state.songs, current_video).await;
    match next {
        Some(video) if video.path != current_video => {
            let current_sample = state
                .events
                .latest_deck_sample(deck)
                .await
                .ok_or_else(|| Error::NotFound(format!("deck {} sample not yet known", deck)))?;
            let bound_filename = current_sample.filename.clone();

            let result = MatchResult {
                video: video.clone(),
                level: bridge_common::models::MatchLevel::Random,
                match_type: MatchType::Random,
                similarity: 0.0,
            };
            state.set_forced_override(deck, result.clone(), bound_filename).await;
            state.tracker.reset(deck).await;

            debug!(deck, video = %video.path, "video-ended switch");

            let mut sample = current_sample;
            sample.filename = video.path.clone();
            state
                .events
                .publish(EventPayload::DeckUpdate {
                    deck,
                    sample,
                    match_result: Some(result),
                    video_elapsed_ms: Some(0),
                })
                .await;
            state
                .events
                .publish(EventPayload::TransitionPool { slots: state.master.current_pool().await })
                .await;

            Ok(VideoEndedOutcome::Switch { video: video.path })
        }
        _ => Ok(VideoEndedOutcome::Loop),
    }
}

async fn transition_slots(state: &Arc<AppState>) -> Vec<TransitionSlot> {
    state
        .transitions
        .list()
        .await
        .into_iter()
        .map(|v| TransitionSlot { path: v.path, bpm: v.bpm })
        .collect()
}

async fn transition_effects(state: &Arc<AppState>) -> Result<(Vec<String>, Vec<String>)> {
    let ins = content::enabled_transition_effects(&state.pool, "in").await?;
    let outs = content::enabled_transition_effects(&state.pool, "out").await?;
    Ok((ins.into_iter().map(|e| e.css).collect(), outs.into_iter().map(|e| e.css).collect()))
}
