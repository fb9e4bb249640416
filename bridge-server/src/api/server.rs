//! Router assembly and graceful shutdown (§5, §6).

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/api/deck/update", post(super::handlers::deck_update))
        .route("/api/force-video", post(super::handlers::force_video))
        .route("/api/force-deck-video", post(super::handlers::force_deck_video))
        .route("/api/deck/video-ended", post(super::handlers::video_ended))
        .route("/events", get(super::sse::event_stream))
        .route("/api/videos", get(super::handlers::list_videos))
        .route(
            "/api/config",
            get(super::handlers::get_config).post(super::handlers::set_config),
        )
        .route("/api/shutdown", post(super::handlers::shutdown))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `/api/shutdown` fires or the process receives
/// ctrl-c, then wait up to 5s for in-flight connections to drain.
pub async fn run(listen: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = listen.parse()?;
    let app = build_router(Arc::clone(&state));

    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.await;
            })
            .await
    };
    let mut serve = std::pin::pin!(serve);

    let shutdown_state = Arc::clone(&state);
    let signal = async move {
        tokio::select! {
            _ = shutdown_state.shutdown.notified() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    };

    tokio::select! {
        result = &mut serve => return result.map_err(Into::into),
        _ = signal => {}
    }

    info!("graceful shutdown started, draining up to 5s");
    let _ = drain_tx.send(());
    match tokio::time::timeout(Duration::from_secs(5), serve).await {
        Ok(result) => result?,
        Err(_) => info!("graceful shutdown grace period elapsed, forcing exit"),
    }

    Ok(())
}
