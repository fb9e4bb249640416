//! Schema creation and seed-content initialization.
//!
//! Runs idempotently on every startup: `CREATE TABLE IF NOT EXISTS` plus an
//! insert-if-absent seed pass for the two content libraries (transition
//! effects, overlay elements). Seeds can be disabled but never deleted.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use tracing::info;

pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bpm_cache (
            path TEXT PRIMARY KEY,
            mtime_secs INTEGER NOT NULL,
            bpm REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transition_effects (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK(kind IN ('in', 'out')),
            css TEXT NOT NULL,
            seed INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS overlay_elements (
            id TEXT PRIMARY KEY,
            css TEXT,
            html TEXT,
            js TEXT,
            config TEXT,
            seed INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    init_seed_transitions(pool).await?;

    Ok(())
}

/// Reinsert seed transition effects if absent. Seeds are identified by a
/// fixed id so a disabled seed is never reinserted as a duplicate.
async fn init_seed_transitions(pool: &Pool<Sqlite>) -> Result<()> {
    let seeds: &[(&str, &str, &str)] = &[
        ("seed-fade-in", "in", "opacity:0;animation:fade-in 400ms ease-out forwards;"),
        ("seed-slide-in", "in", "transform:translateX(100%);animation:slide-in 400ms ease-out forwards;"),
        ("seed-fade-out", "out", "animation:fade-out 400ms ease-in forwards;"),
        ("seed-slide-out", "out", "animation:slide-out 400ms ease-in forwards;"),
    ];

    for (id, kind, css) in seeds {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM transition_effects WHERE id = ?)")
                .bind(id)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query(
                "INSERT INTO transition_effects (id, kind, css, seed, enabled) VALUES (?, ?, ?, 1, 1)",
            )
            .bind(id)
            .bind(kind)
            .bind(css)
            .execute(pool)
            .await?;
            info!("seeded transition effect '{}'", id);
        }
    }

    Ok(())
}
