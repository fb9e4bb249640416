//! Core domain entities shared between the ingest path and the HTTP surface.
//!
//! These mirror the data model table in the design: transient per-request
//! types (`DeckSample`, `MatchResult`) and the longer-lived `VideoFile`
//! record produced by the library index.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// A single sample posted by the probe for one deck.
///
/// Extra JSON fields are ignored by `serde`'s default behavior; missing
/// numeric fields default to 0 and missing strings default to empty via
/// `#[serde(default)]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSample {
    pub deck: i32,
    #[serde(default)]
    pub is_audible: bool,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub bpm: f64,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub total_time_ms: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

/// A video file indexed from one of the two configured directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFile {
    /// Display name (original filename).
    pub name: String,
    /// Served path, e.g. `/videos/song/track.mp4`.
    pub path: String,
    /// Lower-cased filename without extension, precomputed for stem matching.
    pub stem: String,
    /// Detected BPM, 0.0 if unknown.
    pub bpm: f64,
    /// Last-modified time as Unix seconds, used to detect changes on rescan.
    pub mtime_secs: i64,
}

/// Which library a `VideoFile` was scanned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    Song,
    Transition,
}

/// Match level, lower is better. Mirrors the six-tier cascade.
///
/// Serialized as its bare `u8` discriminant (0..5) rather than the variant
/// name, per the wire format's "match level 0..5" data model entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MatchLevel {
    Exact = 0,
    Stem = 1,
    Fuzzy = 2,
    BpmFuzzy = 3,
    Bpm = 4,
    Random = 5,
}

/// How a match (or forced override) was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    Exact,
    Stem,
    Fuzzy,
    BpmFuzzy,
    Bpm,
    Random,
    Forced,
}

/// Result of matching one deck sample against the library index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub video: VideoFile,
    pub level: MatchLevel,
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub similarity: f64,
}

/// One of the three preloaded transition pool slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSlot {
    pub path: String,
    pub bpm: f64,
}

/// Clamp a playback rate to the tolerance band the clients are allowed to
/// trim or seek within.
pub fn clamp_rate(rate: f64) -> f64 {
    rate.clamp(0.25, 4.0)
}

/// Fold a candidate BPM into the nearest of itself, its double, or its half
/// relative to a reference BPM, returning the minimal absolute distance.
pub fn folded_bpm_distance(a: f64, b: f64) -> f64 {
    let d1 = (a - b).abs();
    let d2 = (a - 2.0 * b).abs();
    let d3 = (2.0 * a - b).abs();
    d1.min(d2).min(d3)
}

/// FNV-1a hash of a byte slice, used to derive a stable pseudo-random index
/// from a song name so repeated calls for the same song return the same
/// video.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Normalized Levenshtein similarity in `[0.0, 1.0]`, 1.0 meaning identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_clamp_bounds() {
        assert_eq!(clamp_rate(0.1), 0.25);
        assert_eq!(clamp_rate(10.0), 4.0);
        assert_eq!(clamp_rate(1.0), 1.0);
    }

    #[test]
    fn folded_distance_picks_minimum() {
        // video bpm 70, deck bpm 140: doubled distance is 0
        assert_eq!(folded_bpm_distance(70.0, 140.0), 0.0);
    }

    #[test]
    fn fnv1a_is_stable() {
        assert_eq!(fnv1a(b"same song"), fnv1a(b"same song"));
        assert_ne!(fnv1a(b"song a"), fnv1a(b"song b"));
    }

    #[test]
    fn match_level_serializes_as_its_integer_discriminant() {
        assert_eq!(serde_json::to_string(&MatchLevel::Exact).unwrap(), "0");
        assert_eq!(serde_json::to_string(&MatchLevel::BpmFuzzy).unwrap(), "3");
        assert_eq!(serde_json::from_str::<MatchLevel>("5").unwrap(), MatchLevel::Random);
    }

    #[test]
    fn deck_sample_round_trips_camel_case_field_names() {
        let json = r#"{"deck":1,"isAudible":true,"isPlaying":true,"elapsedMs":500,"filename":"a.mp4","pitch":100.0}"#;
        let sample: DeckSample = serde_json::from_str(json).unwrap();
        assert!(sample.is_audible);
        assert_eq!(sample.elapsed_ms, 500);
        assert!(serde_json::to_string(&sample).unwrap().contains("\"isAudible\":true"));
    }
}
