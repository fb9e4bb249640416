//! Deck Visibility Timer (§4.8).
//!
//! Decks 3 and 4 start hidden and become visible on their first
//! audible+playing sample; a 60s timer since the last such sample hides
//! them again, reset by any further audible+playing sample. Decks 1 and
//! 2 are always visible and never tracked here. One small mutex per §5,
//! independent of the transition lock.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const HIDE_AFTER: Duration = Duration::from_secs(60);
const TRACKED_DECKS: [i32; 2] = [3, 4];

struct DeckState {
    visible: bool,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

pub struct VisibilityTimer {
    decks: Mutex<HashMap<i32, DeckState>>,
}

impl VisibilityTimer {
    pub fn new() -> Self {
        Self {
            decks: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_tracked(deck: i32) -> bool {
        TRACKED_DECKS.contains(&deck)
    }

    /// Feed one sample's audible/playing state for a tracked deck.
    /// Returns `Some(visible)` when the deck's visibility just changed
    /// (report this as a `deck-visibility` event), `None` otherwise.
    /// Restarts the hide timer on every active sample; `on_hide` is
    /// invoked after 60s without one.
    pub async fn on_sample<F, Fut>(&self, deck: i32, audible: bool, playing: bool, on_hide: F) -> Option<bool>
    where
        F: FnOnce(i32) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        if !Self::is_tracked(deck) {
            return None;
        }

        let mut decks = self.decks.lock().await;
        let active_now = audible && playing;

        let entry = decks.entry(deck).or_insert_with(|| DeckState {
            visible: false,
            cancel: None,
            handle: None,
        });

        if active_now {
            if let Some(cancel) = entry.cancel.take() {
                cancel.cancel();
            }
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
            let cancel = CancellationToken::new();
            let cancel_clone = cancel.clone();
            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {}
                    _ = tokio::time::sleep(HIDE_AFTER) => {
                        on_hide(deck).await;
                    }
                }
            });
            entry.cancel = Some(cancel);
            entry.handle = Some(handle);

            if !entry.visible {
                entry.visible = true;
                Some(true)
            } else {
                None
            }
        } else {
            None
        }
    }

    /// Called by the spawned timer's `on_hide` once it fires uncancelled.
    /// Marks the deck hidden and reports the transition.
    pub async fn mark_hidden(&self, deck: i32) -> Option<bool> {
        let mut decks = self.decks.lock().await;
        if let Some(state) = decks.get_mut(&deck) {
            state.cancel = None;
            state.handle = None;
            if state.visible {
                state.visible = false;
                return Some(false);
            }
        }
        None
    }

    pub async fn cancel_all(&self) {
        let mut decks = self.decks.lock().await;
        for (_, state) in decks.iter_mut() {
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            if let Some(handle) = state.handle.take() {
                handle.abort();
            }
        }
    }
}

impl Default for VisibilityTimer {
    fn default() -> Self {
        Self::new()
    }
}
