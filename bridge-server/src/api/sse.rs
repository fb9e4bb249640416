//! GET /events — the outbound event stream (§6).
//!
//! On connect, a subscriber first receives the cached replay set in the
//! order §4.7 prescribes, then live events as they're published.
//! Grounded on the teacher's `BroadcastStream`-to-SSE adaptor, swapped to
//! drain an `mpsc::Receiver` since the event bus already applied
//! backpressure per subscriber.

use crate::state::AppState;
use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("new SSE client connected");
    let (mut rx, replay) = state.events.subscribe().await;

    let stream = stream! {
        for event in replay {
            if let Some(e) = to_sse_event(&event) {
                yield Ok(e);
            }
        }
        while let Some(event) = rx.recv().await {
            if let Some(e) = to_sse_event(&event) {
                yield Ok(e);
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(payload: &bridge_common::events::EventPayload) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Event::default().event(payload.kind()).data(json)),
        Err(e) => {
            tracing::warn!("failed to serialize event {}: {}", payload.kind(), e);
            None
        }
    }
}
