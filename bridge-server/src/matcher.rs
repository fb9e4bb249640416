//! Tiered Matcher (§4.4).
//!
//! Six-level fallback with stable pick-by-song-hash for ties, plus the
//! half-time BPM correction applied on any successful match. The
//! half-time-corrected-paths set lives in its own mutex, deliberately
//! decoupled from the library's `RwLock` so corrections never block the
//! matching hot path (§5 "Shared-resource policy").

use crate::library::LibraryIndex;
use bridge_common::models::{fnv1a, folded_bpm_distance, similarity, MatchLevel, MatchResult, MatchType, VideoFile};
use std::collections::HashSet;
use tokio::sync::Mutex;

const FUZZY_THRESHOLD: f64 = 0.70;
const BPM_FUZZY_SIMILARITY_THRESHOLD: f64 = 0.30;
const HALF_TIME_TOLERANCE: f64 = 3.0;
const TOP_N_FOR_STABLE_PICK: usize = 5;

pub struct Matcher {
    corrected_paths: Mutex<HashSet<String>>,
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            corrected_paths: Mutex::new(HashSet::new()),
        }
    }

    /// Match a deck's current filename + BPM against the song library.
    /// `deck_bpm` of 0.0 means unknown (the probe reports 0 when it can't
    /// determine BPM itself).
    pub async fn match_deck(
        &self,
        index: &LibraryIndex,
        filename: &str,
        deck_bpm: f64,
    ) -> Option<MatchResult> {
        if filename.is_empty() {
            return None;
        }

        let candidates = index.list().await;
        if candidates.is_empty() {
            return None;
        }

        let stem = stem_of(filename);
        let deck_bpm_known = deck_bpm > 0.0;

        let result = exact(&candidates, filename)
            .or_else(|| stem_match(&candidates, &stem))
            .or_else(|| fuzzy(&candidates, filename))
            .or_else(|| deck_bpm_known.then(|| bpm_fuzzy(&candidates, filename, deck_bpm)).flatten())
            .or_else(|| deck_bpm_known.then(|| bpm_only(&candidates, filename, deck_bpm)).flatten())
            .or_else(|| random_stable(&candidates, filename));

        if let Some(mut m) = result {
            if deck_bpm_known {
                self.apply_half_time_correction(index, &mut m, deck_bpm).await;
            }
            Some(m)
        } else {
            None
        }
    }

    /// If the candidate's BPM looks like half the deck's, double it
    /// permanently (in the index and the BPM cache) and remember the path
    /// so later deck samples with a different BPM cannot flip it back.
    async fn apply_half_time_correction(&self, index: &LibraryIndex, m: &mut MatchResult, deck_bpm: f64) {
        if m.video.bpm <= 0.0 {
            return;
        }

        let mut corrected = self.corrected_paths.lock().await;
        if corrected.contains(&m.video.path) {
            return;
        }

        let plain_diff = (m.video.bpm - deck_bpm).abs();
        let doubled_diff = (2.0 * m.video.bpm - deck_bpm).abs();
        if doubled_diff < plain_diff && doubled_diff <= HALF_TIME_TOLERANCE {
            let new_bpm = m.video.bpm * 2.0;
            if let Err(e) = index.correct_bpm(&m.video.path, new_bpm).await {
                tracing::warn!("failed to persist half-time correction: {}", e);
                return;
            }
            m.video.bpm = new_bpm;
            corrected.insert(m.video.path.clone());
        }
    }

    pub async fn get_by_path(&self, index: &LibraryIndex, path: &str) -> Option<VideoFile> {
        index.get_by_path(path).await
    }

    /// Returns any indexed video whose path differs from `current`; if
    /// only one video exists, returns that one.
    pub async fn random_excluding(&self, index: &LibraryIndex, current: &str) -> Option<VideoFile> {
        let candidates = index.list().await;
        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return Some(candidates[0].clone());
        }
        let others: Vec<&VideoFile> = candidates.iter().filter(|v| v.path != current).collect();
        if others.is_empty() {
            return Some(candidates[0].clone());
        }
        let idx = (fnv1a(current.as_bytes()) as usize) % others.len();
        Some(others[idx].clone())
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

fn stem_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_lowercase()
}

fn exact(candidates: &[VideoFile], filename: &str) -> Option<MatchResult> {
    let lower = filename.to_lowercase();
    candidates
        .iter()
        .find(|v| v.name.to_lowercase() == lower)
        .map(|v| MatchResult {
            video: v.clone(),
            level: MatchLevel::Exact,
            match_type: MatchType::Exact,
            similarity: 1.0,
        })
}

fn stem_match(candidates: &[VideoFile], stem: &str) -> Option<MatchResult> {
    candidates
        .iter()
        .find(|v| v.stem == stem)
        .map(|v| MatchResult {
            video: v.clone(),
            level: MatchLevel::Stem,
            match_type: MatchType::Stem,
            similarity: 1.0,
        })
}

fn fuzzy(candidates: &[VideoFile], filename: &str) -> Option<MatchResult> {
    let mut best: Option<(&VideoFile, f64)> = None;
    for v in candidates {
        let sim = similarity(filename, &v.name);
        if sim >= FUZZY_THRESHOLD && best.map(|(_, b)| sim > b).unwrap_or(true) {
            best = Some((v, sim));
        }
    }
    best.map(|(v, sim)| MatchResult {
        video: v.clone(),
        level: MatchLevel::Fuzzy,
        match_type: MatchType::Fuzzy,
        similarity: sim,
    })
}

fn bpm_fuzzy(candidates: &[VideoFile], filename: &str, deck_bpm: f64) -> Option<MatchResult> {
    let eligible: Vec<&VideoFile> = candidates
        .iter()
        .filter(|v| v.bpm > 0.0 && similarity(filename, &v.name) >= BPM_FUZZY_SIMILARITY_THRESHOLD)
        .collect();
    stable_bpm_pick(eligible, filename, deck_bpm, MatchLevel::BpmFuzzy, MatchType::BpmFuzzy)
}

fn bpm_only(candidates: &[VideoFile], filename: &str, deck_bpm: f64) -> Option<MatchResult> {
    let eligible: Vec<&VideoFile> = candidates.iter().filter(|v| v.bpm > 0.0).collect();
    stable_bpm_pick(eligible, filename, deck_bpm, MatchLevel::Bpm, MatchType::Bpm)
}

/// Rank by folded-BPM distance, then pick stably from the top N by
/// FNV-1a hash of the song filename.
fn stable_bpm_pick(
    mut eligible: Vec<&VideoFile>,
    filename: &str,
    deck_bpm: f64,
    level: MatchLevel,
    match_type: MatchType,
) -> Option<MatchResult> {
    if eligible.is_empty() {
        return None;
    }
    eligible.sort_by(|a, b| {
        folded_bpm_distance(a.bpm, deck_bpm)
            .partial_cmp(&folded_bpm_distance(b.bpm, deck_bpm))
            .unwrap()
    });
    eligible.truncate(TOP_N_FOR_STABLE_PICK);
    let idx = (fnv1a(filename.as_bytes()) as usize) % eligible.len();
    let v = eligible[idx];
    Some(MatchResult {
        video: v.clone(),
        level,
        match_type,
        similarity: similarity(filename, &v.name),
    })
}

fn random_stable(candidates: &[VideoFile], filename: &str) -> Option<MatchResult> {
    if candidates.is_empty() {
        return None;
    }
    let idx = (fnv1a(filename.as_bytes()) as usize) % candidates.len();
    let v = &candidates[idx];
    Some(MatchResult {
        video: v.clone(),
        level: MatchLevel::Random,
        match_type: MatchType::Random,
        similarity: similarity(filename, &v.name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BpmCache;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::fs;

    async fn index_with(files: &[&str]) -> LibraryIndex {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            fs::write(dir.path().join(f), b"fake").unwrap();
        }
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::init::init_schema(&pool).await.unwrap();
        let index = LibraryIndex::new(dir.path().to_path_buf(), "/videos/song", BpmCache::new(pool));
        index.scan().await.unwrap();
        // tempdir is leaked intentionally for the lifetime of the test;
        // the index only needs the files to exist during scan().
        std::mem::forget(dir);
        index
    }

    #[tokio::test]
    async fn exact_match_wins_over_fuzzy() {
        let index = index_with(&["track.mp4", "track2.mp4"]).await;
        let matcher = Matcher::new();
        let m = matcher.match_deck(&index, "track.mp4", 0.0).await.unwrap();
        assert_eq!(m.level, MatchLevel::Exact);
    }

    #[tokio::test]
    async fn stable_pick_is_deterministic_for_same_song() {
        let index = index_with(&["a.mp4", "b.mp4", "c.mp4"]).await;
        let matcher = Matcher::new();
        let first = matcher.match_deck(&index, "unmatched_song.mp4", 0.0).await.unwrap();
        let second = matcher.match_deck(&index, "unmatched_song.mp4", 0.0).await.unwrap();
        assert_eq!(first.video.path, second.video.path);
    }

    #[tokio::test]
    async fn half_time_correction_doubles_stored_bpm() {
        let index = index_with(&["slow_65bpm.mp4"]).await;
        let matcher = Matcher::new();
        let m = matcher.match_deck(&index, "slow_65bpm.mp4", 130.0).await.unwrap();
        assert_eq!(m.video.bpm, 130.0);
        assert_eq!(index.get_by_filename("slow_65bpm.mp4").await.unwrap().bpm, 130.0);
    }

    #[tokio::test]
    async fn half_time_correction_not_applied_when_out_of_tolerance() {
        let index = index_with(&["slow_68bpm.mp4"]).await;
        let matcher = Matcher::new();
        let m = matcher.match_deck(&index, "slow_68bpm.mp4", 140.0).await.unwrap();
        // diff(68,140)=72, diff(136,140)=4.0 > 3.0 tolerance: no correction
        assert_eq!(m.video.bpm, 68.0);
    }

    #[tokio::test]
    async fn correction_applied_once_even_if_deck_bpm_changes() {
        let index = index_with(&["slow_65bpm.mp4"]).await;
        let matcher = Matcher::new();
        matcher.match_deck(&index, "slow_65bpm.mp4", 130.0).await.unwrap();
        // A later sample with a very different deck bpm must not flip the
        // correction back.
        let m = matcher.match_deck(&index, "slow_65bpm.mp4", 65.0).await.unwrap();
        assert_eq!(m.video.bpm, 130.0);
    }
}
