use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use preset_core::StatusEvent;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events: SSE stream of verdict changes.
///
/// `status` events carry the full preset status; `removed` events carry
/// `{"preset_id": ...}`.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.event_tx.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|msg| msg.ok().and_then(|event| to_sse(&event)).map(Ok::<Event, Infallible>));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &StatusEvent) -> Option<Event> {
    let (name, data) = match event {
        StatusEvent::Updated { status, .. } => ("status", serde_json::to_string(&**status)),
        StatusEvent::Removed { preset_id } => (
            "removed",
            serde_json::to_string(&serde_json::json!({ "preset_id": preset_id })),
        ),
    };
    match data {
        Ok(data) => Some(Event::default().event(name).data(data)),
        Err(e) => {
            tracing::warn!(preset_id = %event.preset_id(), error = %e, "could not encode event");
            None
        }
    }
}
