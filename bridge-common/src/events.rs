//! Wire event types broadcast over the event bus and fanned out as SSE.
//!
//! One `EventPayload` variant per event kind from the design's event table.
//! `serde(tag = "type")` gives every JSON payload a `type` discriminator,
//! matching the teacher's `WkmpEvent` enum.

use crate::models::{DeckSample, MatchResult, TransitionSlot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    DeckUpdate {
        deck: i32,
        sample: DeckSample,
        #[serde(rename = "match")]
        match_result: Option<MatchResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        video_elapsed_ms: Option<u64>,
    },
    TransitionPool {
        slots: Vec<Option<TransitionSlot>>,
    },
    TransitionPlay {
        slot: usize,
        in_css: String,
        out_css: String,
    },
    DeckVisibility {
        deck: i32,
        visible: bool,
    },
    AnalysisStatus {
        running: bool,
    },
    LibraryUpdated {
        #[serde(skip_serializing_if = "Option::is_none")]
        library: Option<String>,
    },
    ConfigUpdated {
        key: String,
        value: String,
    },
    OverlayUpdated {
        elements: Vec<serde_json::Value>,
    },
    LoopVideoTransition {
        active: bool,
        css: Option<String>,
    },
    TransitionsUpdated {},
}

impl EventPayload {
    /// The SSE event name / bus kind, used for dispatch and replay cache
    /// keys. Matches the literal names in the design's event table.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::DeckUpdate { .. } => "deck-update",
            EventPayload::TransitionPool { .. } => "transition-pool",
            EventPayload::TransitionPlay { .. } => "transition-play",
            EventPayload::DeckVisibility { .. } => "deck-visibility",
            EventPayload::AnalysisStatus { .. } => "analysis-status",
            EventPayload::LibraryUpdated { .. } => "library-updated",
            EventPayload::ConfigUpdated { .. } => "config-updated",
            EventPayload::OverlayUpdated { .. } => "overlay-updated",
            EventPayload::LoopVideoTransition { .. } => "loop-video-transition",
            EventPayload::TransitionsUpdated {} => "transitions-updated",
        }
    }
}
