//! Video Position Tracker (§4.5).
//!
//! Server-authoritative playback-ms accumulator, one per deck, active only
//! while the deck's match level is 2 or higher (levels 0/1 ride the song's
//! own elapsed time instead). Each deck's sync state lives under its own
//! small mutex per §5, decoupled from the transition critical section.

use bridge_common::models::clamp_rate;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct DeckVideoSync {
    video_path: String,
    last_update: Instant,
    accumulated_ms: u64,
    last_rate: f64,
    was_playing: bool,
}

pub struct VideoPositionTracker {
    decks: Mutex<HashMap<i32, DeckVideoSync>>,
}

impl VideoPositionTracker {
    pub fn new() -> Self {
        Self {
            decks: Mutex::new(HashMap::new()),
        }
    }

    /// Advance the accumulator for `deck` and return the new elapsed ms.
    /// `deck_bpm`/`video_bpm` of 0.0 mean unknown.
    pub async fn update(
        &self,
        deck: i32,
        video_path: &str,
        playing: bool,
        pitch: f64,
        deck_bpm: f64,
        video_bpm: f64,
    ) -> u64 {
        let rate = if deck_bpm > 0.0 && video_bpm > 0.0 {
            clamp_rate((pitch / 100.0) * (deck_bpm / video_bpm))
        } else {
            clamp_rate(pitch / 100.0)
        };

        let now = Instant::now();
        let mut decks = self.decks.lock().await;

        let accumulated_ms = match decks.get(&deck) {
            Some(sync) if sync.video_path == video_path => {
                if sync.was_playing {
                    let elapsed = now.duration_since(sync.last_update).as_secs_f64();
                    sync.accumulated_ms + (elapsed * 1000.0 * sync.last_rate).round() as u64
                } else {
                    sync.accumulated_ms
                }
            }
            _ => 0,
        };

        decks.insert(
            deck,
            DeckVideoSync {
                video_path: video_path.to_string(),
                last_update: now,
                accumulated_ms,
                last_rate: rate,
                was_playing: playing,
            },
        );

        accumulated_ms
    }

    /// Drop a deck's sync state, e.g. when a forced override resets it.
    pub async fn reset(&self, deck: i32) {
        self.decks.lock().await.remove(&deck);
    }
}

impl Default for VideoPositionTracker {
    fn default() -> Self {
        Self::new()
    }
}
