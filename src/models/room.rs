// src/models/room.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::not_blank;

/// Lifecycle of a room. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Finished,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::InProgress => "in_progress",
            RoomStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RoomStatus::Waiting),
            "in_progress" => Ok(RoomStatus::InProgress),
            "finished" => Ok(RoomStatus::Finished),
            other => Err(format!("unknown room status '{}'", other)),
        }
    }
}

/// One examiner-created exam instance tied to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub category_id: String,
    pub category_name: String,
    pub name: String,
    pub examiner_id: String,
    pub examiner_name: String,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
}

/// DTO for creating a room. The examiner identity comes from the token.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[validate(length(max = 100), custom(function = not_blank))]
    pub category_id: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub category_name: String,
    #[validate(length(max = 200), custom(function = not_blank))]
    pub room_name: String,
}
