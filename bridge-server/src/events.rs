//! Event Bus (§4.7).
//!
//! One-to-many fan-out for the wire events defined in
//! `bridge_common::events`, with a per-event-kind replay cache so a
//! late-joining SSE client can reconstruct current state, and a bounded
//! per-subscriber queue that drops events (with a warning) rather than
//! block a slow client. Grounded on the broadcaster's publish/subscribe
//! split, but backed by per-subscriber `mpsc` channels instead of a single
//! `broadcast` channel so a full queue only affects its own subscriber.

use bridge_common::events::EventPayload;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<EventPayload>,
}

pub struct EventBus {
    cache: RwLock<HashMap<&'static str, Vec<EventPayload>>>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Publish one event: update the replay cache, then fan out to every
    /// subscriber. `deck-update` and `deck-visibility` keep one cached
    /// entry per deck, `config-updated` keeps one cached entry per key
    /// (sub-keyed ones are few enough to just scan); all other kinds keep
    /// a single latest entry.
    pub async fn publish(&self, event: EventPayload) {
        self.remember(&event).await;

        let subs = self.subscribers.read().await;
        for sub in subs.iter() {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = sub.id, kind = event.kind(), "subscriber queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Publish several events in order with no other publish interleaved
    /// between them, as required by the transition-play/transition-pool/
    /// deck-update ordering invariant. Callers hold the election's
    /// transition-critical-section lock across the whole call already,
    /// so this is just a sequential loop.
    pub async fn publish_sequence(&self, events: Vec<EventPayload>) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Register a new subscriber and return its receiver plus the replay
    /// sequence it should be sent first, in the order prescribed by §4.7:
    /// analysis-status, all deck-visibility, all deck-update,
    /// transition-pool, all config-updated, overlay-updated.
    pub async fn subscribe(&self) -> (mpsc::Receiver<EventPayload>, Vec<EventPayload>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.subscribers.write().await.push(Subscriber { id, tx });

        let cache = self.cache.read().await;
        let mut replay = Vec::new();
        for kind in [
            "analysis-status",
            "deck-visibility",
            "deck-update",
            "transition-pool",
            "config-updated",
            "overlay-updated",
        ] {
            if let Some(events) = cache.get(kind) {
                replay.extend(events.iter().cloned());
            }
        }
        (rx, replay)
    }

    /// Look up the most recently cached sample for a deck, without
    /// creating a subscriber. Used by the force-video path to snapshot
    /// "the deck's current filename" per §4.1.
    pub async fn latest_deck_sample(&self, deck: i32) -> Option<bridge_common::models::DeckSample> {
        let cache = self.cache.read().await;
        cache.get("deck-update").and_then(|events| {
            events.iter().find_map(|e| match e {
                EventPayload::DeckUpdate { deck: d, sample, .. } if *d == deck => Some(sample.clone()),
                _ => None,
            })
        })
    }

    /// Drop subscribers whose receiver has been dropped, e.g. on client
    /// disconnect. Cheap to call opportunistically; not required for
    /// correctness since `try_send` to a closed channel is a no-op.
    pub async fn prune_closed(&self) {
        self.subscribers.write().await.retain(|s| !s.tx.is_closed());
    }

    async fn remember(&self, event: &EventPayload) {
        let mut cache = self.cache.write().await;
        let kind = event.kind();
        let slot = cache.entry(kind).or_default();
        match event {
            EventPayload::DeckUpdate { deck, .. } => {
                slot.retain(|e| !matches!(e, EventPayload::DeckUpdate { deck: d, .. } if d == deck));
                slot.push(event.clone());
            }
            EventPayload::DeckVisibility { deck, .. } => {
                slot.retain(|e| !matches!(e, EventPayload::DeckVisibility { deck: d, .. } if d == deck));
                slot.push(event.clone());
            }
            EventPayload::ConfigUpdated { key, .. } => {
                slot.retain(|e| !matches!(e, EventPayload::ConfigUpdated { key: k, .. } if k == key));
                slot.push(event.clone());
            }
            _ => {
                slot.clear();
                slot.push(event.clone());
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_sample(deck: i32) -> bridge_common::models::DeckSample {
        bridge_common::models::DeckSample {
            deck,
            is_audible: false,
            is_playing: false,
            volume: 0.0,
            elapsed_ms: 0,
            bpm: 0.0,
            filename: String::new(),
            pitch: 100.0,
            total_time_ms: None,
            title: None,
            artist: None,
        }
    }

    #[tokio::test]
    async fn late_joiner_gets_replay_of_latest_per_deck() {
        let bus = EventBus::new();
        bus.publish(EventPayload::DeckUpdate {
            deck: 1,
            sample: empty_sample(1),
            match_result: None,
            video_elapsed_ms: None,
        })
        .await;
        bus.publish(EventPayload::DeckUpdate {
            deck: 2,
            sample: empty_sample(2),
            match_result: None,
            video_elapsed_ms: None,
        })
        .await;

        let (_rx, replay) = bus.subscribe().await;
        let deck_updates: Vec<_> = replay
            .iter()
            .filter(|e| matches!(e, EventPayload::DeckUpdate { .. }))
            .collect();
        assert_eq!(deck_updates.len(), 2);
    }

    #[tokio::test]
    async fn late_joiner_gets_replay_of_latest_per_config_key() {
        let bus = EventBus::new();
        bus.publish(EventPayload::ConfigUpdated { key: "loop_video_enabled".into(), value: "true".into() }).await;
        bus.publish(EventPayload::ConfigUpdated { key: "song_dir".into(), value: "/videos/song".into() }).await;
        bus.publish(EventPayload::ConfigUpdated { key: "loop_video_enabled".into(), value: "false".into() }).await;

        let (_rx, replay) = bus.subscribe().await;
        let config_updates: Vec<_> =
            replay.iter().filter(|e| matches!(e, EventPayload::ConfigUpdated { .. })).collect();
        assert_eq!(config_updates.len(), 2, "one cached entry per key, not per publish");
        assert!(config_updates.iter().any(|e| matches!(e, EventPayload::ConfigUpdated { key, value }
            if key == "loop_video_enabled" && value == "false")));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let (mut rx, _replay) = bus.subscribe().await;
        bus.publish(EventPayload::AnalysisStatus { running: true }).await;
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, EventPayload::AnalysisStatus { running: true }));
    }

    #[tokio::test]
    async fn full_queue_drops_without_panicking() {
        let bus = EventBus::new();
        let (_rx, _replay) = bus.subscribe().await;
        for _ in 0..(SUBSCRIBER_QUEUE_CAPACITY + 10) {
            bus.publish(EventPayload::AnalysisStatus { running: true }).await;
        }
    }
}
