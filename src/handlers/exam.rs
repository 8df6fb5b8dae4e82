// src/handlers/exam.rs

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};

use crate::{
    error::{AppError, ExamFailure},
    models::exam_result::SubmitExamRequest,
    services::{grading, paper},
    state::AppState,
};

/// Generates a randomized exam paper for a category.
///
/// Questions and their choices are shuffled; the correct answer id is
/// removed from every question before it is serialized.
pub async fn generate_paper(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<impl IntoResponse, ExamFailure> {
    let paper =
        paper::build_exam_paper(state.store.as_ref(), &category_id, state.config.question_cap)
            .await?;

    Ok(Json(paper))
}

/// Submits a participant's answers for a room and returns the score.
///
/// * Grades only questions of the room's category.
/// * Stores the result at the `<room>_<user>` key (resubmission overwrites).
/// * Marks the participant `submitted` if they joined the room.
pub async fn submit_paper(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    payload: Result<Json<SubmitExamRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ExamFailure> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let answers = req.answer_map();

    let graded = grading::grade_submission(
        state.store.as_ref(),
        &state.live,
        state.config.cutoff,
        &room_id,
        req.user_id.as_deref(),
        req.user_email.as_deref(),
        answers,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "message": "Exam submitted successfully",
        "score": graded.outcome.score,
        "totalQuestions": graded.outcome.total,
    })))
}
