//! Shared application state (§5).
//!
//! Each shared resource gets its own small lock, per the "shared-resource
//! policy": the library indices, matcher, tracker, master election (which
//! internally is the one "transition critical section"), visibility
//! timer, config store, and forced-override table are all independent —
//! no operation here ever holds two of them at once across an await
//! point that also publishes to the event bus.

use crate::db::ConfigStore;
use crate::events::EventBus;
use crate::library::LibraryIndex;
use crate::master::MasterElection;
use crate::matcher::Matcher;
use crate::tracker::VideoPositionTracker;
use crate::visibility::VisibilityTimer;
use bridge_common::models::MatchResult;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, RwLock};

/// A client-installed override, valid only while the deck keeps reporting
/// the filename it was installed for.
#[derive(Debug, Clone)]
pub struct ForcedOverride {
    pub result: MatchResult,
    pub bound_filename: String,
}

pub struct AppState {
    pub songs: LibraryIndex,
    pub transitions: LibraryIndex,
    pub matcher: Matcher,
    pub tracker: VideoPositionTracker,
    pub master: MasterElection,
    pub visibility: VisibilityTimer,
    pub config: ConfigStore,
    pub events: EventBus,
    pub pool: SqlitePool,
    /// The address the HTTP/SSE listener was bound to, reported by `/health`.
    pub listen_addr: String,
    /// Per-deck forced override, set by `/api/force-video` and
    /// `/api/force-deck-video`, cleared by the next natural match on that
    /// deck once the video actually changes again.
    pub forced: RwLock<HashMap<i32, ForcedOverride>>,
    /// True while the BPM analyser is scanning the library; ingest drops
    /// samples during this window per §4.1.
    pub analysing: AtomicBool,
    /// Decks beyond 4, counted but otherwise ignored.
    pub extra_decks_seen: AtomicBool,
    /// Signaled by `POST /api/shutdown` to begin graceful termination.
    pub shutdown: Notify,
}

impl AppState {
    pub fn new(songs: LibraryIndex, transitions: LibraryIndex, config: ConfigStore, pool: SqlitePool) -> Self {
        Self::with_listen_addr(songs, transitions, config, pool, String::new())
    }

    pub fn with_listen_addr(
        songs: LibraryIndex,
        transitions: LibraryIndex,
        config: ConfigStore,
        pool: SqlitePool,
        listen_addr: String,
    ) -> Self {
        Self {
            songs,
            transitions,
            matcher: Matcher::new(),
            tracker: VideoPositionTracker::new(),
            master: MasterElection::new(),
            visibility: VisibilityTimer::new(),
            config,
            events: EventBus::new(),
            pool,
            listen_addr,
            forced: RwLock::new(HashMap::new()),
            analysing: AtomicBool::new(false),
            extra_decks_seen: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn is_analysing(&self) -> bool {
        self.analysing.load(Ordering::Acquire)
    }

    pub fn set_analysing(&self, running: bool) {
        self.analysing.store(running, Ordering::Release);
    }

    pub async fn forced_override(&self, deck: i32) -> Option<ForcedOverride> {
        self.forced.read().await.get(&deck).cloned()
    }

    pub async fn set_forced_override(&self, deck: i32, result: MatchResult, bound_filename: String) {
        self.forced
            .write()
            .await
            .insert(deck, ForcedOverride { result, bound_filename });
    }

    pub async fn clear_forced_override(&self, deck: i32) {
        self.forced.write().await.remove(&deck);
    }
}
