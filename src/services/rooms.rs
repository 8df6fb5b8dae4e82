// src/services/rooms.rs

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        exam_result::ExamResult,
        identity::Actor,
        participant::{JoinRoomRequest, Participant, ParticipantStatus},
        room::{CreateRoomRequest, Room, RoomStatus},
    },
    repositories::{ExamStore, RoomFilter},
    services::live::{ChangeEvent, LiveHub, LiveQuery},
    utils::html::clean_text,
};

/// Owner of the room or an elevated role.
fn ensure_can_manage(room: &Room, actor: &Actor) -> AppResult<()> {
    if room.examiner_id == actor.id || actor.role.is_elevated() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the room's examiner or an administrator may do this".to_string(),
        ))
    }
}

async fn load_room(store: &dyn ExamStore, room_id: &str) -> AppResult<Room> {
    store
        .get_room(room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' not found", room_id)))
}

/// Creates a room in `waiting` state owned by `actor`.
pub async fn create_room(
    store: &dyn ExamStore,
    live: &LiveHub,
    actor: &Actor,
    req: CreateRoomRequest,
) -> AppResult<Room> {
    if !actor.role.can_create_rooms() {
        return Err(AppError::Forbidden(
            "Only examiners may create rooms".to_string(),
        ));
    }
    req.validate()?;

    let name = clean_text(&req.room_name);
    if name.is_empty() {
        return Err(AppError::BadRequest("Room name is required".to_string()));
    }

    let category_id = req.category_id.trim().to_string();
    let category_name = match clean_text(&req.category_name) {
        given if !given.is_empty() => given,
        _ => store
            .get_category(&category_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| category_id.clone()),
    };

    let room = Room {
        id: Uuid::new_v4().to_string(),
        category_id,
        category_name,
        name,
        examiner_id: actor.id.clone(),
        examiner_name: clean_text(&actor.display_name()),
        status: RoomStatus::Waiting,
        created_at: Utc::now(),
    };

    store.insert_room(&room).await?;
    tracing::info!(
        "Room {} ({}) created by {} for category {}",
        room.id,
        room.name,
        room.examiner_id,
        room.category_id
    );
    live.publish(ChangeEvent::Room(room.clone()));

    Ok(room)
}

pub async fn get_room(store: &dyn ExamStore, room_id: &str) -> AppResult<Room> {
    load_room(store, room_id).await
}

/// Query behind the participants' room picker.
pub fn open_rooms_query() -> LiveQuery {
    LiveQuery::Rooms(RoomFilter::Open)
}

pub async fn list_open_rooms(store: &dyn ExamStore) -> AppResult<Vec<Room>> {
    store.list_rooms(&RoomFilter::Open).await
}

/// Query behind an examiner's dashboard: own rooms, or every room for
/// elevated roles.
pub fn owned_rooms_query(actor: &Actor) -> AppResult<LiveQuery> {
    if actor.role.is_elevated() {
        Ok(LiveQuery::Rooms(RoomFilter::All))
    } else if actor.role.can_create_rooms() {
        Ok(LiveQuery::Rooms(RoomFilter::OwnedBy(actor.id.clone())))
    } else {
        Err(AppError::Forbidden(
            "Only examiners may list their rooms".to_string(),
        ))
    }
}

pub async fn list_owned_rooms(store: &dyn ExamStore, actor: &Actor) -> AppResult<Vec<Room>> {
    match owned_rooms_query(actor)? {
        LiveQuery::Rooms(filter) => store.list_rooms(&filter).await,
        LiveQuery::Participants { .. } => Ok(Vec::new()),
    }
}

/// Moves a `waiting` room to `in_progress`. A finished room stays finished,
/// including when it is closed between the read and the write.
pub async fn start_room(
    store: &dyn ExamStore,
    live: &LiveHub,
    room_id: &str,
    actor: &Actor,
) -> AppResult<Room> {
    let room = load_room(store, room_id).await?;
    ensure_can_manage(&room, actor)?;

    match room.status {
        RoomStatus::InProgress => Ok(room),
        RoomStatus::Finished => Err(already_finished(room_id)),
        RoomStatus::Waiting => match store.set_room_status(room_id, RoomStatus::InProgress).await? {
            Some(room) => {
                tracing::info!("Room {} started by {}", room.id, actor.id);
                live.publish(ChangeEvent::Room(room.clone()));
                Ok(room)
            }
            // Closed (or deleted) concurrently
            None => {
                load_room(store, room_id).await?;
                Err(already_finished(room_id))
            }
        },
    }
}

fn already_finished(room_id: &str) -> AppError {
    AppError::Conflict(format!("Room '{}' is already finished", room_id))
}

/// Marks a room `finished`. Closing a finished room is a no-op.
///
/// Submissions already in flight are not cancelled; see `CutoffPolicy`.
pub async fn close_room(
    store: &dyn ExamStore,
    live: &LiveHub,
    room_id: &str,
    actor: &Actor,
) -> AppResult<Room> {
    let room = load_room(store, room_id).await?;
    ensure_can_manage(&room, actor)?;

    if room.status == RoomStatus::Finished {
        return Ok(room);
    }

    match store.set_room_status(room_id, RoomStatus::Finished).await? {
        Some(room) => {
            tracing::info!("Room {} closed by {}", room.id, actor.id);
            live.publish(ChangeEvent::Room(room.clone()));
            Ok(room)
        }
        // Another close won the race
        None => load_room(store, room_id).await,
    }
}

/// Adds `actor` to the roster as `waiting`. Joining again overwrites the entry.
pub async fn join_room(
    store: &dyn ExamStore,
    live: &LiveHub,
    room_id: &str,
    actor: &Actor,
    req: JoinRoomRequest,
) -> AppResult<Participant> {
    req.validate()?;
    let room = load_room(store, room_id).await?;

    let display_name = req
        .display_name
        .as_deref()
        .map(clean_text)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| clean_text(&actor.display_name()));
    let email = req
        .email
        .or_else(|| actor.email.clone())
        .unwrap_or_default()
        .trim()
        .to_string();

    let participant = Participant {
        room_id: room.id.clone(),
        user_id: actor.id.clone(),
        display_name,
        email,
        status: ParticipantStatus::Waiting,
        score: 0,
        total_questions: 0,
        joined_at: Utc::now(),
    };

    store.upsert_participant(&participant).await?;
    tracing::info!("User {} joined room {}", participant.user_id, room.id);
    live.publish(ChangeEvent::Participant(participant.clone()));

    Ok(participant)
}

/// Marks the caller's attempt as started. Never moves a participant backwards.
pub async fn start_attempt(
    store: &dyn ExamStore,
    live: &LiveHub,
    room_id: &str,
    actor: &Actor,
) -> AppResult<Participant> {
    if let Some(participant) = store.mark_in_progress(room_id, &actor.id).await? {
        live.publish(ChangeEvent::Participant(participant.clone()));
        return Ok(participant);
    }

    store
        .get_participant(room_id, &actor.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("You have not joined room '{}'", room_id)))
}

/// Query behind a room's detail view.
pub async fn participants_query(
    store: &dyn ExamStore,
    room_id: &str,
    actor: &Actor,
) -> AppResult<LiveQuery> {
    let room = load_room(store, room_id).await?;
    ensure_can_manage(&room, actor)?;
    Ok(LiveQuery::Participants {
        room_id: room.id,
    })
}

pub async fn list_participants(
    store: &dyn ExamStore,
    room_id: &str,
    actor: &Actor,
) -> AppResult<Vec<Participant>> {
    let room = load_room(store, room_id).await?;
    ensure_can_manage(&room, actor)?;
    store.list_participants(&room.id).await
}

pub async fn list_results(
    store: &dyn ExamStore,
    room_id: &str,
    actor: &Actor,
) -> AppResult<Vec<ExamResult>> {
    let room = load_room(store, room_id).await?;
    ensure_can_manage(&room, actor)?;
    store.list_results(&room.id).await
}
