// src/repositories/mod.rs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{
        exam_result::ExamResult,
        participant::Participant,
        question::{AnswerKey, Category, Question},
        room::{Room, RoomStatus},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which rooms a listing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomFilter {
    /// Rooms still accepting joiners (`waiting`).
    Open,
    /// Rooms created by one examiner.
    OwnedBy(String),
    /// Every room.
    All,
}

impl RoomFilter {
    pub fn matches(&self, room: &Room) -> bool {
        match self {
            RoomFilter::Open => room.status == RoomStatus::Waiting,
            RoomFilter::OwnedBy(examiner_id) => &room.examiner_id == examiner_id,
            RoomFilter::All => true,
        }
    }
}

/// The shared persistent store behind the engine.
///
/// Every method is one round trip and atomic per document. Listings are
/// returned newest first. Writes keyed by a deterministic id overwrite.
#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn get_category(&self, id: &str) -> AppResult<Option<Category>>;
    async fn upsert_category(&self, category: &Category) -> AppResult<()>;

    async fn questions_by_category(&self, category_id: &str) -> AppResult<Vec<Question>>;
    /// Ids of every question tagged with `category_id`.
    async fn question_ids_by_category(&self, category_id: &str) -> AppResult<Vec<String>>;
    /// Answer keys of `question_ids`, restricted to questions of `category_id`.
    async fn answer_keys(
        &self,
        category_id: &str,
        question_ids: &[String],
    ) -> AppResult<Vec<AnswerKey>>;
    async fn upsert_question(&self, question: &Question) -> AppResult<()>;

    async fn insert_room(&self, room: &Room) -> AppResult<()>;
    async fn get_room(&self, id: &str) -> AppResult<Option<Room>>;
    /// Moves a room that is not `finished` to `status`, checked and written
    /// atomically. Returns the updated room, or `None` if it does not exist or
    /// is already finished.
    async fn set_room_status(&self, id: &str, status: RoomStatus) -> AppResult<Option<Room>>;
    async fn list_rooms(&self, filter: &RoomFilter) -> AppResult<Vec<Room>>;

    async fn upsert_participant(&self, participant: &Participant) -> AppResult<()>;
    async fn get_participant(&self, room_id: &str, user_id: &str)
    -> AppResult<Option<Participant>>;
    /// Moves a `waiting` participant to `in_progress`. Returns the updated
    /// record, or `None` if no waiting participant matched.
    async fn mark_in_progress(&self, room_id: &str, user_id: &str)
    -> AppResult<Option<Participant>>;
    /// Records a graded submission on the roster. Returns `None` if the
    /// participant does not exist.
    async fn mark_submitted(
        &self,
        room_id: &str,
        user_id: &str,
        score: u32,
        total_questions: u32,
    ) -> AppResult<Option<Participant>>;
    async fn list_participants(&self, room_id: &str) -> AppResult<Vec<Participant>>;

    async fn upsert_result(&self, result: &ExamResult) -> AppResult<()>;
    async fn get_result(&self, id: &str) -> AppResult<Option<ExamResult>>;
    async fn list_results(&self, room_id: &str) -> AppResult<Vec<ExamResult>>;
}
