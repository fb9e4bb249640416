//! Coordination server binary: parses CLI flags, opens the store, scans
//! both video libraries, starts the watchers, and serves the HTTP/SSE
//! surface until shutdown.

use anyhow::Result;
use bridge_server::config::{Args, CONFIG_KEY_SONG_DIR, CONFIG_KEY_TRANSITION_DIR};
use bridge_server::db::{self, BpmCache, ConfigStore};
use bridge_common::events::EventPayload;
use bridge_server::library::LibraryIndex;
use bridge_server::state::AppState;
use bridge_server::{api, library};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "bridge_server=debug,tower_http=debug"
    } else {
        "bridge_server=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting bridge-server v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("fatal startup error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let db_url = format!("sqlite:{}?mode=rwc", args.database.display());
    let pool = sqlx::sqlite::SqlitePoolOptions::new().max_connections(5).connect(&db_url).await?;
    db::init::init_schema(&pool).await?;
    info!("database ready at {}", args.database.display());

    let config = ConfigStore::load(pool.clone()).await?;
    if config.get(CONFIG_KEY_SONG_DIR).await.is_none() {
        config.set(CONFIG_KEY_SONG_DIR, &args.song_dir.to_string_lossy()).await?;
    }
    if config.get(CONFIG_KEY_TRANSITION_DIR).await.is_none() {
        config.set(CONFIG_KEY_TRANSITION_DIR, &args.transition_dir.to_string_lossy()).await?;
    }

    let song_dir = PathBuf::from(config.get_or(CONFIG_KEY_SONG_DIR, &args.song_dir.to_string_lossy()).await);
    let transition_dir =
        PathBuf::from(config.get_or(CONFIG_KEY_TRANSITION_DIR, &args.transition_dir.to_string_lossy()).await);

    let songs = LibraryIndex::new(song_dir, "/videos/song", BpmCache::new(pool.clone()));
    let transitions = LibraryIndex::new(transition_dir, "/videos/transition", BpmCache::new(pool.clone()));

    let state = Arc::new(AppState::with_listen_addr(songs, transitions, config, pool, args.listen.clone()));

    state.set_analysing(true);
    state.events.publish(EventPayload::AnalysisStatus { running: true }).await;
    state.songs.scan().await?;
    state.transitions.scan().await?;
    state.set_analysing(false);
    state.events.publish(EventPayload::AnalysisStatus { running: false }).await;
    info!(
        "initial scan complete: {} songs, {} transitions",
        state.songs.list().await.len(),
        state.transitions.list().await.len()
    );

    let watcher_cancel = CancellationToken::new();

    let song_watch_state = Arc::clone(&state);
    let song_watch_cancel = watcher_cancel.clone();
    let song_watcher = tokio::spawn(async move {
        let state = song_watch_state;
        library::watch(&state.songs, song_watch_cancel, || {
            let state = Arc::clone(&state);
            async move {
                state.events.publish(EventPayload::LibraryUpdated { library: Some("song".into()) }).await;
                enforce_loop_video_guard(&state).await;
            }
        })
        .await;
    });

    let transition_watch_state = Arc::clone(&state);
    let transition_watch_cancel = watcher_cancel.clone();
    let transition_watcher = tokio::spawn(async move {
        let state = transition_watch_state;
        library::watch(&state.transitions, transition_watch_cancel, || {
            let state = Arc::clone(&state);
            async move {
                state.events.publish(EventPayload::LibraryUpdated { library: Some("transition".into()) }).await;
            }
        })
        .await;
    });

    if args.no_browser {
        info!("suppressing browser auto-open");
    } else {
        info!("browser auto-open not implemented in this environment; open {} manually", args.listen);
    }

    api::server::run(&args.listen, Arc::clone(&state)).await?;

    watcher_cancel.cancel();
    let _ = song_watcher.await;
    let _ = transition_watcher.await;

    info!("bridge-server shutting down");
    Ok(())
}

/// §4.10: if the song library lost the configured loop-video file, clear
/// both settings and tell every client.
async fn enforce_loop_video_guard(state: &AppState) {
    let Some(path) = state.config.get("loop_video_path").await else { return };
    if state.songs.get_by_path(&path).await.is_none() {
        warn!("configured loop video {} no longer exists, clearing", path);
        if let Err(e) = state.config.set("loop_video_path", "").await {
            warn!("failed to clear loop_video_path: {}", e);
        }
        if let Err(e) = state.config.set("loop_video_enabled", "false").await {
            warn!("failed to clear loop_video_enabled: {}", e);
        }
        state
            .events
            .publish(EventPayload::ConfigUpdated { key: "loop_video_path".into(), value: String::new() })
            .await;
        state
            .events
            .publish(EventPayload::ConfigUpdated { key: "loop_video_enabled".into(), value: "false".into() })
            .await;
    }
}
