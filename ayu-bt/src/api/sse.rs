//! Server-Sent Events stream of batch events

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
///
/// Streams every `AyuEvent` (batch created, stage submitted/advanced, leaf
/// verified, verification reset, batch locked, notification created).
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ayu_common::sse::create_event_sse_stream("ayu-bt", &state.event_bus)
}
