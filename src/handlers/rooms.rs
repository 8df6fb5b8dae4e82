// src/handlers/rooms.rs

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{
        identity::Actor,
        participant::JoinRoomRequest,
        room::CreateRoomRequest,
    },
    services::rooms,
    state::AppState,
};

/// Creates a room for the calling examiner.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, AppError> {
    let room = rooms::create_room(state.store.as_ref(), &state.live, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// Rooms still waiting for participants.
pub async fn list_open_rooms(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(rooms::list_open_rooms(state.store.as_ref()).await?))
}

/// The caller's rooms, or every room for administrators and directors.
pub async fn list_my_rooms(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(rooms::list_owned_rooms(state.store.as_ref(), &actor).await?))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(rooms::get_room(state.store.as_ref(), &room_id).await?))
}

pub async fn start_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let room = rooms::start_room(state.store.as_ref(), &state.live, &room_id, &actor).await?;
    Ok(Json(room))
}

/// Closes a room. Closing twice is not an error.
pub async fn close_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let room = rooms::close_room(state.store.as_ref(), &state.live, &room_id, &actor).await?;
    Ok(Json(room))
}

/// Joins the caller to a room. The body is optional.
pub async fn join_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room_id): Path<String>,
    payload: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => JoinRoomRequest::default(),
        Err(e) => return Err(AppError::BadRequest(e.body_text())),
    };
    let participant =
        rooms::join_room(state.store.as_ref(), &state.live, &room_id, &actor, req).await?;
    Ok(Json(participant))
}

/// Marks the caller's attempt as started.
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let participant =
        rooms::start_attempt(state.store.as_ref(), &state.live, &room_id, &actor).await?;
    Ok(Json(participant))
}

pub async fn list_participants(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        rooms::list_participants(state.store.as_ref(), &room_id, &actor).await?,
    ))
}

pub async fn list_results(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        rooms::list_results(state.store.as_ref(), &room_id, &actor).await?,
    ))
}
