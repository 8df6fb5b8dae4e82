// src/repositories/postgres.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use crate::{
    error::{AppError, AppResult},
    models::{
        exam_result::ExamResult,
        participant::{Participant, ParticipantStatus},
        question::{AnswerKey, Category, Choice, Question},
        room::{Room, RoomStatus},
    },
    repositories::{ExamStore, RoomFilter},
};

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Represents the 'questions' table.
#[derive(FromRow)]
struct QuestionRow {
    id: String,
    category_id: String,
    text: String,
    choices: Json<Vec<Choice>>,
    correct_answer_id: String,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            category_id: row.category_id,
            text: row.text,
            choices: row.choices.0,
            correct_answer_id: row.correct_answer_id,
        }
    }
}

/// Helper struct for fetching answer keys from the database.
#[derive(FromRow)]
struct AnswerKeyRow {
    id: String,
    correct_answer_id: String,
}

/// Represents the 'rooms' table.
#[derive(FromRow)]
struct RoomRow {
    id: String,
    category_id: String,
    category_name: String,
    name: String,
    examiner_id: String,
    examiner_name: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = AppError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        Ok(Room {
            status: row
                .status
                .parse::<RoomStatus>()
                .map_err(AppError::InternalServerError)?,
            id: row.id,
            category_id: row.category_id,
            category_name: row.category_name,
            name: row.name,
            examiner_id: row.examiner_id,
            examiner_name: row.examiner_name,
            created_at: row.created_at,
        })
    }
}

/// Represents the 'participants' table.
#[derive(FromRow)]
struct ParticipantRow {
    room_id: String,
    user_id: String,
    display_name: String,
    email: String,
    status: String,
    score: i32,
    total_questions: i32,
    joined_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Participant {
            status: row
                .status
                .parse::<ParticipantStatus>()
                .map_err(AppError::InternalServerError)?,
            room_id: row.room_id,
            user_id: row.user_id,
            display_name: row.display_name,
            email: row.email,
            score: row.score.max(0) as u32,
            total_questions: row.total_questions.max(0) as u32,
            joined_at: row.joined_at,
        })
    }
}

/// Represents the 'exam_results' table.
#[derive(FromRow)]
struct ResultRow {
    id: String,
    room_id: String,
    category_id: String,
    user_id: String,
    user_email: String,
    score: i32,
    total_questions: i32,
    answers: Json<BTreeMap<String, String>>,
    submitted_at: DateTime<Utc>,
}

impl From<ResultRow> for ExamResult {
    fn from(row: ResultRow) -> Self {
        ExamResult {
            id: row.id,
            room_id: row.room_id,
            category_id: row.category_id,
            user_id: row.user_id,
            user_email: row.user_email,
            score: row.score.max(0) as u32,
            total_questions: row.total_questions.max(0) as u32,
            answers: row.answers.0,
            submitted_at: row.submitted_at,
        }
    }
}

const ROOM_COLUMNS: &str =
    "id, category_id, category_name, name, examiner_id, examiner_name, status, created_at";
const PARTICIPANT_COLUMNS: &str =
    "room_id, user_id, display_name, email, status, score, total_questions, joined_at";
const RESULT_COLUMNS: &str = "id, room_id, category_id, user_id, user_email, score, total_questions, answers, submitted_at";

fn log_db_error(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!("{}: {:?}", context, e);
        AppError::InternalServerError(e.to_string())
    }
}

#[async_trait]
impl ExamStore for PgStore {
    async fn get_category(&self, id: &str) -> AppResult<Option<Category>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, name FROM categories WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(log_db_error("Failed to fetch category"))?;

        Ok(row.map(|(id, name)| Category { id, name }))
    }

    async fn upsert_category(&self, category: &Category) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .execute(&self.pool)
        .await
        .map_err(log_db_error("Failed to upsert category"))?;
        Ok(())
    }

    async fn questions_by_category(&self, category_id: &str) -> AppResult<Vec<Question>> {
        let rows: Vec<QuestionRow> = sqlx::query_as(
            r#"
            SELECT id, category_id, text, choices, correct_answer_id
            FROM questions
            WHERE category_id = $1
            ORDER BY id
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(log_db_error("Failed to fetch questions"))?;

        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn question_ids_by_category(&self, category_id: &str) -> AppResult<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM questions WHERE category_id = $1")
                .bind(category_id)
                .fetch_all(&self.pool)
                .await
                .map_err(log_db_error("Failed to fetch scoped question ids"))?;
        Ok(ids)
    }

    async fn answer_keys(
        &self,
        category_id: &str,
        question_ids: &[String],
    ) -> AppResult<Vec<AnswerKey>> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<AnswerKeyRow> = sqlx::query_as(
            r#"
            SELECT id, correct_answer_id
            FROM questions
            WHERE category_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(category_id)
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(log_db_error("Failed to fetch answer keys"))?;

        Ok(rows
            .into_iter()
            .map(|row| AnswerKey {
                question_id: row.id,
                correct_answer_id: row.correct_answer_id,
            })
            .collect())
    }

    async fn upsert_question(&self, question: &Question) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, category_id, text, choices, correct_answer_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                category_id = EXCLUDED.category_id,
                text = EXCLUDED.text,
                choices = EXCLUDED.choices,
                correct_answer_id = EXCLUDED.correct_answer_id
            "#,
        )
        .bind(&question.id)
        .bind(&question.category_id)
        .bind(&question.text)
        .bind(Json(&question.choices))
        .bind(&question.correct_answer_id)
        .execute(&self.pool)
        .await
        .map_err(log_db_error("Failed to upsert question"))?;
        Ok(())
    }

    async fn insert_room(&self, room: &Room) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rooms
            (id, category_id, category_name, name, examiner_id, examiner_name, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&room.id)
        .bind(&room.category_id)
        .bind(&room.category_name)
        .bind(&room.name)
        .bind(&room.examiner_id)
        .bind(&room.examiner_name)
        .bind(room.status.as_str())
        .bind(room.created_at)
        .execute(&self.pool)
        .await
        .map_err(log_db_error("Failed to insert room"))?;
        Ok(())
    }

    async fn get_room(&self, id: &str) -> AppResult<Option<Room>> {
        let row: Option<RoomRow> =
            sqlx::query_as(&format!("SELECT {} FROM rooms WHERE id = $1", ROOM_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(log_db_error("Failed to fetch room"))?;

        row.map(Room::try_from).transpose()
    }

    async fn set_room_status(&self, id: &str, status: RoomStatus) -> AppResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(&format!(
            "UPDATE rooms SET status = $2 WHERE id = $1 AND status <> $3 RETURNING {}",
            ROOM_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(RoomStatus::Finished.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("Failed to update room status"))?;

        row.map(Room::try_from).transpose()
    }

    async fn list_rooms(&self, filter: &RoomFilter) -> AppResult<Vec<Room>> {
        let rows: Vec<RoomRow> = match filter {
            RoomFilter::Open => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM rooms WHERE status = $1 ORDER BY created_at DESC, id DESC",
                    ROOM_COLUMNS
                ))
                .bind(RoomStatus::Waiting.as_str())
                .fetch_all(&self.pool)
                .await
            }
            RoomFilter::OwnedBy(examiner_id) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM rooms WHERE examiner_id = $1 ORDER BY created_at DESC, id DESC",
                    ROOM_COLUMNS
                ))
                .bind(examiner_id)
                .fetch_all(&self.pool)
                .await
            }
            RoomFilter::All => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM rooms ORDER BY created_at DESC, id DESC",
                    ROOM_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(log_db_error("Failed to list rooms"))?;

        rows.into_iter().map(Room::try_from).collect()
    }

    async fn upsert_participant(&self, participant: &Participant) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO participants
            (room_id, user_id, display_name, email, status, score, total_questions, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (room_id, user_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                email = EXCLUDED.email,
                status = EXCLUDED.status,
                score = EXCLUDED.score,
                total_questions = EXCLUDED.total_questions,
                joined_at = EXCLUDED.joined_at
            "#,
        )
        .bind(&participant.room_id)
        .bind(&participant.user_id)
        .bind(&participant.display_name)
        .bind(&participant.email)
        .bind(participant.status.as_str())
        .bind(participant.score as i32)
        .bind(participant.total_questions as i32)
        .bind(participant.joined_at)
        .execute(&self.pool)
        .await
        .map_err(log_db_error("Failed to upsert participant"))?;
        Ok(())
    }

    async fn get_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> AppResult<Option<Participant>> {
        let row: Option<ParticipantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM participants WHERE room_id = $1 AND user_id = $2",
            PARTICIPANT_COLUMNS
        ))
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("Failed to fetch participant"))?;

        row.map(Participant::try_from).transpose()
    }

    async fn mark_in_progress(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> AppResult<Option<Participant>> {
        let row: Option<ParticipantRow> = sqlx::query_as(&format!(
            "UPDATE participants SET status = $3 \
             WHERE room_id = $1 AND user_id = $2 AND status = $4 RETURNING {}",
            PARTICIPANT_COLUMNS
        ))
        .bind(room_id)
        .bind(user_id)
        .bind(ParticipantStatus::InProgress.as_str())
        .bind(ParticipantStatus::Waiting.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("Failed to start participant attempt"))?;

        row.map(Participant::try_from).transpose()
    }

    async fn mark_submitted(
        &self,
        room_id: &str,
        user_id: &str,
        score: u32,
        total_questions: u32,
    ) -> AppResult<Option<Participant>> {
        let row: Option<ParticipantRow> = sqlx::query_as(&format!(
            "UPDATE participants SET status = $3, score = $4, total_questions = $5 \
             WHERE room_id = $1 AND user_id = $2 RETURNING {}",
            PARTICIPANT_COLUMNS
        ))
        .bind(room_id)
        .bind(user_id)
        .bind(ParticipantStatus::Submitted.as_str())
        .bind(score as i32)
        .bind(total_questions as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("Failed to update participant after grading"))?;

        row.map(Participant::try_from).transpose()
    }

    async fn list_participants(&self, room_id: &str) -> AppResult<Vec<Participant>> {
        let rows: Vec<ParticipantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM participants WHERE room_id = $1 ORDER BY joined_at, user_id",
            PARTICIPANT_COLUMNS
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(log_db_error("Failed to list participants"))?;

        rows.into_iter().map(Participant::try_from).collect()
    }

    async fn upsert_result(&self, result: &ExamResult) -> AppResult<()> {
        // Upsert: a retried submission replaces the previous grading pass as a whole.
        sqlx::query(
            r#"
            INSERT INTO exam_results
            (id, room_id, category_id, user_id, user_email, score, total_questions, answers, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                category_id = EXCLUDED.category_id,
                user_email = EXCLUDED.user_email,
                score = EXCLUDED.score,
                total_questions = EXCLUDED.total_questions,
                answers = EXCLUDED.answers,
                submitted_at = EXCLUDED.submitted_at
            "#,
        )
        .bind(&result.id)
        .bind(&result.room_id)
        .bind(&result.category_id)
        .bind(&result.user_id)
        .bind(&result.user_email)
        .bind(result.score as i32)
        .bind(result.total_questions as i32)
        .bind(Json(&result.answers))
        .bind(result.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(log_db_error("Failed to upsert exam result"))?;
        Ok(())
    }

    async fn get_result(&self, id: &str) -> AppResult<Option<ExamResult>> {
        let row: Option<ResultRow> = sqlx::query_as(&format!(
            "SELECT {} FROM exam_results WHERE id = $1",
            RESULT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("Failed to fetch exam result"))?;

        Ok(row.map(ExamResult::from))
    }

    async fn list_results(&self, room_id: &str) -> AppResult<Vec<ExamResult>> {
        let rows: Vec<ResultRow> = sqlx::query_as(&format!(
            "SELECT {} FROM exam_results WHERE room_id = $1 ORDER BY submitted_at DESC",
            RESULT_COLUMNS
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(log_db_error("Failed to list exam results"))?;

        Ok(rows.into_iter().map(ExamResult::from).collect())
    }
}
