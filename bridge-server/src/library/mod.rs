//! Library Index & Watcher (§4.2).
//!
//! Two independent indices (song, transition) are each an
//! [`LibraryIndex`]; their served paths use different prefixes so URLs
//! never collide. `scan` replaces the whole index; `watch` polls at a
//! fixed interval and does an incremental add/modify/delete diff so only
//! changed files pay the BPM-extraction cost.

pub mod bpm;

use crate::db::BpmCache;
use crate::error::Result;
use bridge_common::models::VideoFile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const VIDEO_EXTENSION: &str = "mp4";
pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

pub struct LibraryIndex {
    dir: PathBuf,
    served_prefix: String,
    entries: RwLock<HashMap<String, VideoFile>>,
    bpm_cache: BpmCache,
}

impl LibraryIndex {
    pub fn new(dir: PathBuf, served_prefix: impl Into<String>, bpm_cache: BpmCache) -> Self {
        Self {
            dir,
            served_prefix: served_prefix.into(),
            entries: RwLock::new(HashMap::new()),
            bpm_cache,
        }
    }

    /// Full rescan: read every eligible file, extract BPM, replace the
    /// index atomically.
    pub async fn scan(&self) -> Result<()> {
        let files = read_eligible_files(&self.dir)?;
        let mut fresh = HashMap::with_capacity(files.len());
        for (filename, path, mtime_secs) in files {
            let video = self.build_entry(&filename, &path, mtime_secs).await;
            fresh.insert(filename, video);
        }
        *self.entries.write().await = fresh;
        Ok(())
    }

    /// Incremental diff against the current snapshot: only added/modified
    /// files have BPM re-extracted; unchanged files carry over untouched
    /// (preserving any half-time correction already applied to them).
    /// Returns true if anything changed.
    pub async fn rescan_incremental(&self) -> Result<bool> {
        let files = read_eligible_files(&self.dir)?;
        let mut changed = false;

        let previous = self.entries.read().await.clone();
        let mut fresh = HashMap::with_capacity(files.len());

        for (filename, path, mtime_secs) in files {
            match previous.get(&filename) {
                Some(existing) if existing.mtime_secs == mtime_secs => {
                    fresh.insert(filename, existing.clone());
                }
                _ => {
                    changed = true;
                    let video = self.build_entry(&filename, &path, mtime_secs).await;
                    fresh.insert(filename, video);
                }
            }
        }

        if fresh.len() != previous.len() {
            changed = true;
        }

        if changed {
            *self.entries.write().await = fresh;
        }
        Ok(changed)
    }

    async fn build_entry(&self, filename: &str, path: &Path, mtime_secs: i64) -> VideoFile {
        let bpm = match self.bpm_cache.get(&path.to_string_lossy(), mtime_secs).await {
            Ok(Some(cached)) => cached,
            _ => {
                let extracted = bpm::extract_bpm(path, filename);
                if let Err(e) = self
                    .bpm_cache
                    .put(&path.to_string_lossy(), mtime_secs, extracted)
                    .await
                {
                    warn!("failed to persist bpm cache entry for {}: {}", filename, e);
                }
                extracted
            }
        };

        VideoFile {
            name: filename.to_string(),
            path: format!("{}/{}", self.served_prefix, filename),
            stem: stem_of(filename),
            bpm,
            mtime_secs,
        }
    }

    /// Sorted by case-insensitive filename, for stable display.
    pub async fn list(&self) -> Vec<VideoFile> {
        let mut all: Vec<VideoFile> = self.entries.read().await.values().cloned().collect();
        all.sort_by_key(|v| v.name.to_lowercase());
        all
    }

    pub async fn get_by_filename(&self, filename: &str) -> Option<VideoFile> {
        let lower = filename.to_lowercase();
        self.entries
            .read()
            .await
            .values()
            .find(|v| v.name.to_lowercase() == lower)
            .cloned()
    }

    pub async fn get_by_path(&self, served_path: &str) -> Option<VideoFile> {
        self.entries
            .read()
            .await
            .values()
            .find(|v| v.path == served_path)
            .cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Apply a half-time correction in place and persist it, so
    /// subsequent rescans of an unchanged file carry the corrected value.
    pub async fn correct_bpm(&self, served_path: &str, new_bpm: f64) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(video) = entries.values_mut().find(|v| v.path == served_path) {
            video.bpm = new_bpm;
            let abs_path = self.dir.join(&video.name);
            self.bpm_cache
                .put(&abs_path.to_string_lossy(), video.mtime_secs, new_bpm)
                .await?;
        }
        Ok(())
    }
}

fn stem_of(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_lowercase()
}

fn read_eligible_files(dir: &Path) -> Result<Vec<(String, PathBuf, i64)>> {
    let mut out = Vec::new();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            debug!("library directory {} unreadable: {}", dir.display(), e);
            return Ok(out);
        }
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_video = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(VIDEO_EXTENSION))
            .unwrap_or(false);
        if !is_video {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        out.push((filename.to_string(), path, mtime_secs));
    }
    Ok(out)
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Poll loop driving incremental rescans until `cancel` fires. Calls
/// `on_changed` whenever a rescan actually mutated the index, so the
/// caller can publish `library-updated` and re-run the loop-video guard.
pub async fn watch<F, Fut>(index: &LibraryIndex, cancel: CancellationToken, mut on_changed: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("library watcher stopped");
                return;
            }
            _ = ticker.tick() => {
                match index.rescan_incremental().await {
                    Ok(true) => on_changed().await,
                    Ok(false) => {}
                    Err(e) => debug!("library watch tick failed, will retry: {}", e),
                }
            }
        }
    }
}
