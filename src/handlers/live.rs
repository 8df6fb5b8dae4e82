// src/handlers/live.rs

use std::{convert::Infallible, time::Duration};

use axum::{
    Extension,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};

use crate::{
    error::{AppError, AppResult},
    models::identity::Actor,
    services::{
        live::{LiveQuery, Snapshot},
        rooms,
    },
    state::AppState,
};

/// Serializes each snapshot as one `snapshot` event; store failures become
/// `error` events and the stream keeps going.
fn to_event(snapshot: AppResult<Snapshot>) -> Result<Event, Infallible> {
    let event = match snapshot {
        Ok(snapshot) => Event::default()
            .event("snapshot")
            .json_data(&snapshot)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
        Err(e) => {
            tracing::warn!("Live snapshot failed: {}", e);
            Event::default().event("error").data(e.message())
        }
    };
    Ok(event)
}

fn stream_query(
    state: &AppState,
    query: LiveQuery,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let subscription = state.live.subscribe(state.store.clone(), query);
    tracing::debug!("Live subscription opened: {:?}", subscription.query());

    Sse::new(subscription.into_stream().map(to_event))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Live list of rooms accepting participants.
pub async fn stream_open_rooms(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    stream_query(&state, rooms::open_rooms_query())
}

/// Live dashboard of the caller's rooms.
pub async fn stream_my_rooms(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let query = rooms::owned_rooms_query(&actor)?;
    Ok(stream_query(&state, query))
}

/// Live roster of one room.
pub async fn stream_participants(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let query = rooms::participants_query(state.store.as_ref(), &room_id, &actor).await?;
    Ok(stream_query(&state, query))
}
