//! BPM cache keyed by absolute path + mod-time (§3 `BpmCacheEntry`).
//!
//! A cache hit requires the stored mod-time to match the file's current
//! mod-time exactly; any mismatch (including the file having vanished) is
//! treated as a miss and the extractor re-runs.

use crate::error::Result;
use sqlx::{Pool, Sqlite};

pub struct BpmCache {
    pool: Pool<Sqlite>,
}

impl BpmCache {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn get(&self, path: &str, mtime_secs: i64) -> Result<Option<f64>> {
        let row: Option<(i64, f64)> =
            sqlx::query_as("SELECT mtime_secs, bpm FROM bpm_cache WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(cached_mtime, bpm)| (cached_mtime == mtime_secs).then_some(bpm)))
    }

    pub async fn put(&self, path: &str, mtime_secs: i64, bpm: f64) -> Result<()> {
        sqlx::query(
            "INSERT INTO bpm_cache (path, mtime_secs, bpm) VALUES (?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET mtime_secs = excluded.mtime_secs, bpm = excluded.bpm",
        )
        .bind(path)
        .bind(mtime_secs)
        .bind(bpm)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init::init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn mtime_mismatch_is_a_miss() {
        let cache = BpmCache::new(test_pool().await);
        cache.put("/a.mp4", 100, 128.0).await.unwrap();
        assert_eq!(cache.get("/a.mp4", 100).await.unwrap(), Some(128.0));
        assert_eq!(cache.get("/a.mp4", 101).await.unwrap(), None);
    }
}
