//! Durable key/value config store (§4.9).
//!
//! Mirrors the teacher's generic get/set-setting pattern: values are stored
//! as `TEXT` and parsed on read. Writers go through `ConfigStore::set`,
//! which persists then broadcasts `config-updated` and updates the cache —
//! the cache and the durable row are always updated together.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct ConfigStore {
    pool: Pool<Sqlite>,
    cache: RwLock<HashMap<String, String>>,
}

impl ConfigStore {
    pub async fn load(pool: Pool<Sqlite>) -> Result<Self> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM config")
            .fetch_all(&pool)
            .await?;
        let cache = rows.into_iter().collect();
        Ok(Self {
            pool,
            cache: RwLock::new(cache),
        })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.cache.read().await.get(key).cloned()
    }

    pub async fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).await.unwrap_or_else(|| default.to_string())
    }

    pub async fn all(&self) -> HashMap<String, String> {
        self.cache.read().await.clone()
    }

    /// Persist a value and update the in-memory cache. Returns the value
    /// that was stored so the caller can broadcast `config-updated`.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        self.cache
            .write()
            .await
            .insert(key.to_string(), value.to_string());
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
    async fn set_then_get_round_trips() {
        let store = ConfigStore::load(test_pool().await).await.unwrap();
        store.set("song_dir", "/videos/songs").await.unwrap();
        assert_eq!(store.get("song_dir").await.as_deref(), Some("/videos/songs"));
    }

    #[tokio::test]
    async fn missing_key_uses_default() {
        let store = ConfigStore::load(test_pool().await).await.unwrap();
        assert_eq!(store.get_or("missing", "fallback").await, "fallback");
    }
}
