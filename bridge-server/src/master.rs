//! Master Election & Transition Pool (§4.6).
//!
//! The election rule is specified as a pure function per the design notes
//! ("Master-deck election as a pure function"): `(active decks,
//! previous master) -> new master`. The transition pool mutation, cursor
//! advance, and effect selection are likewise pure, so the async state
//! wrapper only needs to own a single mutex guarding all of it — the
//! "transition critical section" from §5.

use bridge_common::models::TransitionSlot;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use tokio::sync::Mutex;

const POOL_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveDeckRecord {
    pub audible: bool,
    pub playing: bool,
    pub volume: f64,
    pub has_video: bool,
}

impl ActiveDeckRecord {
    fn is_candidate(&self) -> bool {
        self.audible && self.playing && self.has_video
    }
}

/// Pure election rule: among candidate decks, the highest volume wins;
/// ties favor the current master to avoid oscillation. If no deck
/// qualifies, the previous master is retained.
pub fn elect_master(decks: &HashMap<i32, ActiveDeckRecord>, previous_master: i32) -> i32 {
    let mut best: Option<(i32, f64)> = None;
    for (&deck, record) in decks {
        if !record.is_candidate() {
            continue;
        }
        match best {
            None => best = Some((deck, record.volume)),
            Some((_, best_volume)) => {
                if record.volume > best_volume
                    || (record.volume == best_volume && deck == previous_master)
                {
                    best = Some((deck, record.volume));
                }
            }
        }
    }
    best.map(|(deck, _)| deck).unwrap_or(previous_master)
}

/// The outcome of a master-election step that the caller must publish, in
/// order, before the triggering `deck-update`.
pub struct TransitionOutcome {
    pub play: Option<TransitionPlay>,
    pub pool: Option<Vec<Option<TransitionSlot>>>,
}

pub struct TransitionPlay {
    pub slot: usize,
    pub in_css: String,
    pub out_css: String,
}

pub struct TransitionPool {
    slots: [Option<TransitionSlot>; POOL_SIZE],
    cursor: usize,
}

impl TransitionPool {
    fn new() -> Self {
        Self {
            slots: [None, None, None],
            cursor: 0,
        }
    }

    fn snapshot(&self) -> Vec<Option<TransitionSlot>> {
        self.slots.to_vec()
    }

    /// Fill any empty slot from the transition library, skipping paths
    /// already held by other slots to avoid pool duplicates when possible.
    fn refill(&mut self, available: &[TransitionSlot]) {
        if available.is_empty() {
            return;
        }
        for i in 0..POOL_SIZE {
            if self.slots[i].is_some() {
                continue;
            }
            self.refill_slot(i, available);
        }
    }

    /// Replace one slot with a fresh pick, skipping paths already held by
    /// the other two slots to avoid pool duplicates when possible. Used to
    /// restock the slot a just-played transition vacated.
    fn refill_slot(&mut self, slot: usize, available: &[TransitionSlot]) {
        if available.is_empty() {
            self.slots[slot] = None;
            return;
        }
        let held: Vec<&str> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != slot)
            .filter_map(|(_, s)| s.as_ref().map(|v| v.path.as_str()))
            .collect();
        let pick = available
            .iter()
            .find(|v| !held.contains(&v.path.as_str()))
            .or_else(|| available.first());
        self.slots[slot] = pick.cloned();
    }
}

pub struct MasterElection {
    decks: Mutex<MasterState>,
}

struct MasterState {
    active: HashMap<i32, ActiveDeckRecord>,
    master: i32,
    pool: TransitionPool,
}

impl MasterElection {
    pub fn new() -> Self {
        Self {
            decks: Mutex::new(MasterState {
                active: HashMap::new(),
                master: 0,
                pool: TransitionPool::new(),
            }),
        }
    }

    pub async fn current_master(&self) -> i32 {
        self.decks.lock().await.master
    }

    pub async fn current_pool(&self) -> Vec<Option<TransitionSlot>> {
        self.decks.lock().await.pool.snapshot()
    }

    /// Update one deck's active record, recompute the master, and return
    /// the transition events that must be published (in order) before the
    /// triggering deck-update.
    pub async fn on_sample(
        &self,
        deck: i32,
        record: ActiveDeckRecord,
        transition_videos: &[TransitionSlot],
        in_effects: &[String],
        out_effects: &[String],
    ) -> TransitionOutcome {
        let mut state = self.decks.lock().await;
        state.active.insert(deck, record);

        let previous_master = state.master;
        let new_master = elect_master(&state.active, previous_master);

        if new_master == previous_master {
            return TransitionOutcome { play: None, pool: None };
        }

        state.master = new_master;

        match (previous_master, new_master) {
            (0, _) => {
                // First master appears: no transition event, just fill the pool.
                state.pool.refill(transition_videos);
                TransitionOutcome {
                    play: None,
                    pool: Some(state.pool.snapshot()),
                }
            }
            (_, 0) => {
                // Master disappeared: retain the previous frame, no event.
                TransitionOutcome { play: None, pool: None }
            }
            (_, _) => {
                // Master handover.
                let slot = state.pool.cursor;
                state.pool.cursor = (state.pool.cursor + 1) % POOL_SIZE;

                let in_css = pick_effect(in_effects).unwrap_or_default();
                let out_css = pick_effect(out_effects).unwrap_or_default();

                state.pool.refill_slot(slot, transition_videos);

                TransitionOutcome {
                    play: Some(TransitionPlay { slot, in_css, out_css }),
                    pool: Some(state.pool.snapshot()),
                }
            }
        }
    }

    /// Remove a deck's active record entirely, e.g. when it stops being
    /// reported (used by the "too many decks" / disconnect paths is not
    /// required by spec; kept for symmetry with `on_sample`'s insert).
    pub async fn clear_deck(&self, deck: i32) {
        self.decks.lock().await.active.remove(&deck);
    }
}

impl Default for MasterElection {
    fn default() -> Self {
        Self::new()
    }
}

fn pick_effect(effects: &[String]) -> Option<String> {
    effects.choose(&mut rand::thread_rng()).cloned()
}
