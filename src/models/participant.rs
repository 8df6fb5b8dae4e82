// src/models/participant.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Progress of a participant within a room.
/// Ordered so that `a < b` means `b` is further along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Waiting,
    InProgress,
    Submitted,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Waiting => "waiting",
            ParticipantStatus::InProgress => "in_progress",
            ParticipantStatus::Submitted => "submitted",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(ParticipantStatus::Waiting),
            "in_progress" => Ok(ParticipantStatus::InProgress),
            "submitted" => Ok(ParticipantStatus::Submitted),
            other => Err(format!("unknown participant status '{}'", other)),
        }
    }
}

/// A user's membership and progress record within one room.
/// Identified by `(room_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub status: ParticipantStatus,
    pub score: u32,
    pub total_questions: u32,
    pub joined_at: DateTime<Utc>,
}

/// DTO for joining a room. Missing fields fall back to the token's profile.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}
