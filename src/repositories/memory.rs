// src/repositories/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{
        exam_result::ExamResult,
        participant::{Participant, ParticipantStatus},
        question::{AnswerKey, Category, Question},
        room::{Room, RoomStatus},
    },
    repositories::{ExamStore, RoomFilter},
};

#[derive(Default)]
struct Collections {
    categories: HashMap<String, Category>,
    questions: HashMap<String, Question>,
    rooms: HashMap<String, Room>,
    participants: HashMap<(String, String), Participant>,
    results: HashMap<String, ExamResult>,
}

/// In-process store with the same keying and overwrite semantics as `PgStore`.
/// Used when no `DATABASE_URL` is configured and by the test-suite.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn participant_key(room_id: &str, user_id: &str) -> (String, String) {
    (room_id.to_string(), user_id.to_string())
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn get_category(&self, id: &str) -> AppResult<Option<Category>> {
        Ok(self.inner.read().await.categories.get(id).cloned())
    }

    async fn upsert_category(&self, category: &Category) -> AppResult<()> {
        self.inner
            .write()
            .await
            .categories
            .insert(category.id.clone(), category.clone());
        Ok(())
    }

    async fn questions_by_category(&self, category_id: &str) -> AppResult<Vec<Question>> {
        let inner = self.inner.read().await;
        let mut questions: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.category_id == category_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(questions)
    }

    async fn question_ids_by_category(&self, category_id: &str) -> AppResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .questions
            .values()
            .filter(|q| q.category_id == category_id)
            .map(|q| q.id.clone())
            .collect())
    }

    async fn answer_keys(
        &self,
        category_id: &str,
        question_ids: &[String],
    ) -> AppResult<Vec<AnswerKey>> {
        let inner = self.inner.read().await;
        Ok(question_ids
            .iter()
            .filter_map(|id| inner.questions.get(id))
            .filter(|q| q.category_id == category_id)
            .map(|q| AnswerKey {
                question_id: q.id.clone(),
                correct_answer_id: q.correct_answer_id.clone(),
            })
            .collect())
    }

    async fn upsert_question(&self, question: &Question) -> AppResult<()> {
        self.inner
            .write()
            .await
            .questions
            .insert(question.id.clone(), question.clone());
        Ok(())
    }

    async fn insert_room(&self, room: &Room) -> AppResult<()> {
        self.inner
            .write()
            .await
            .rooms
            .insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn get_room(&self, id: &str) -> AppResult<Option<Room>> {
        Ok(self.inner.read().await.rooms.get(id).cloned())
    }

    async fn set_room_status(&self, id: &str, status: RoomStatus) -> AppResult<Option<Room>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .rooms
            .get_mut(id)
            .filter(|room| room.status != RoomStatus::Finished)
            .map(|room| {
                room.status = status;
                room.clone()
            }))
    }

    async fn list_rooms(&self, filter: &RoomFilter) -> AppResult<Vec<Room>> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<Room> = inner
            .rooms
            .values()
            .filter(|room| filter.matches(room))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rooms)
    }

    async fn upsert_participant(&self, participant: &Participant) -> AppResult<()> {
        self.inner.write().await.participants.insert(
            participant_key(&participant.room_id, &participant.user_id),
            participant.clone(),
        );
        Ok(())
    }

    async fn get_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> AppResult<Option<Participant>> {
        Ok(self
            .inner
            .read()
            .await
            .participants
            .get(&participant_key(room_id, user_id))
            .cloned())
    }

    async fn mark_in_progress(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> AppResult<Option<Participant>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .participants
            .get_mut(&participant_key(room_id, user_id))
            .filter(|p| p.status == ParticipantStatus::Waiting)
            .map(|p| {
                p.status = ParticipantStatus::InProgress;
                p.clone()
            }))
    }

    async fn mark_submitted(
        &self,
        room_id: &str,
        user_id: &str,
        score: u32,
        total_questions: u32,
    ) -> AppResult<Option<Participant>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .participants
            .get_mut(&participant_key(room_id, user_id))
            .map(|p| {
                p.status = ParticipantStatus::Submitted;
                p.score = score;
                p.total_questions = total_questions;
                p.clone()
            }))
    }

    async fn list_participants(&self, room_id: &str) -> AppResult<Vec<Participant>> {
        let inner = self.inner.read().await;
        let mut participants: Vec<Participant> = inner
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        participants.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(participants)
    }

    async fn upsert_result(&self, result: &ExamResult) -> AppResult<()> {
        self.inner
            .write()
            .await
            .results
            .insert(result.id.clone(), result.clone());
        Ok(())
    }

    async fn get_result(&self, id: &str) -> AppResult<Option<ExamResult>> {
        Ok(self.inner.read().await.results.get(id).cloned())
    }

    async fn list_results(&self, room_id: &str) -> AppResult<Vec<ExamResult>> {
        let inner = self.inner.read().await;
        let mut results: Vec<ExamResult> = inner
            .results
            .values()
            .filter(|r| r.room_id == room_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(results)
    }
}
