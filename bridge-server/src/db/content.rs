//! Read access to the seeded content libraries: transition effects (CSS
//! in/out snippets) and overlay elements. Writers are out of scope for the
//! core (they belong to the config-CRUD screens), so this module is
//! read-only plus the enable/disable toggle §6 allows.

use crate::error::Result;
use serde::Serialize;
use sqlx::{Pool, Sqlite};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TransitionEffect {
    pub id: String,
    pub kind: String,
    pub css: String,
    pub seed: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OverlayElement {
    pub id: String,
    pub css: Option<String>,
    pub html: Option<String>,
    pub js: Option<String>,
    pub config: Option<String>,
    pub seed: bool,
    pub enabled: bool,
}

pub async fn enabled_transition_effects(pool: &Pool<Sqlite>, kind: &str) -> Result<Vec<TransitionEffect>> {
    let rows = sqlx::query_as(
        "SELECT id, kind, css, seed, enabled FROM transition_effects WHERE kind = ? AND enabled = 1",
    )
    .bind(kind)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn enabled_overlay_elements(pool: &Pool<Sqlite>) -> Result<Vec<OverlayElement>> {
    let rows = sqlx::query_as(
        "SELECT id, css, html, js, config, seed, enabled FROM overlay_elements WHERE enabled = 1",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
