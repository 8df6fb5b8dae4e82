// src/services/grading.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;

use crate::{
    config::CutoffPolicy,
    error::{AppError, AppResult},
    models::{
        exam_result::{ExamResult, GradeOutcome, result_key},
        participant::Participant,
        room::RoomStatus,
    },
    repositories::ExamStore,
    services::live::{ChangeEvent, LiveHub},
};

/// What happened to the roster entry after the result was stored.
/// Never affects the outcome of the grading call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterUpdate {
    Updated(Participant),
    /// The user submitted without joining the room.
    Skipped,
    Failed(String),
}

/// Outcome of one grading pass.
#[derive(Debug, Clone)]
pub struct Graded {
    pub outcome: GradeOutcome,
    pub result: ExamResult,
    pub roster: RosterUpdate,
}

/// Counts submitted answers matching their key. Questions without a key are
/// not counted towards the total.
pub fn calculate_score(
    user_answers: &BTreeMap<String, String>,
    answer_keys: &HashMap<String, String>,
) -> GradeOutcome {
    let mut score = 0u32;
    let mut total = 0u32;

    for (question_id, user_answer) in user_answers {
        if let Some(correct) = answer_keys.get(question_id) {
            total += 1;
            // Strict id matching
            if user_answer == correct {
                score += 1;
            }
        }
    }

    GradeOutcome { score, total }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

/// Grades a submission for `room_id` and stores it at the `(room, user)` key.
///
/// Only questions of the room's category are graded; foreign ids are ignored.
/// Everything up to the result write is fail-closed. The roster update that
/// follows is best-effort and reported through [`RosterUpdate`].
pub async fn grade_submission(
    store: &dyn ExamStore,
    live: &LiveHub,
    cutoff: CutoffPolicy,
    room_id: &str,
    user_id: Option<&str>,
    user_email: Option<&str>,
    answers: BTreeMap<String, String>,
) -> AppResult<Graded> {
    let user_id = required(user_id, "userId")?;
    let user_email = required(user_email, "userEmail")?;

    // 1. Resolve room
    let room = store
        .get_room(room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' not found", room_id)))?;

    if cutoff == CutoffPolicy::Strict && room.status == RoomStatus::Finished {
        return Err(AppError::Conflict(format!(
            "Room '{}' is closed and no longer accepts submissions",
            room_id
        )));
    }

    // 2. Scope to the room's category
    let scoped: HashSet<String> = store
        .question_ids_by_category(&room.category_id)
        .await?
        .into_iter()
        .collect();
    if scoped.is_empty() {
        return Err(AppError::NotFound(format!(
            "No questions found for category '{}'",
            room.category_id
        )));
    }

    let submitted_in_scope: Vec<String> = answers
        .keys()
        .filter(|id| scoped.contains(*id))
        .cloned()
        .collect();

    let stray = answers.len() - submitted_in_scope.len();
    if stray > 0 {
        tracing::warn!(
            "Ignoring {} answers outside category {} in room {} from user {}",
            stray,
            room.category_id,
            room.id,
            user_id
        );
    }

    // 3. Fetch keys for the scoped ids only
    let answer_keys: HashMap<String, String> = store
        .answer_keys(&room.category_id, &submitted_in_scope)
        .await?
        .into_iter()
        .map(|k| (k.question_id, k.correct_answer_id))
        .collect();
    if answer_keys.is_empty() {
        return Err(AppError::NotFound(
            "No answer keys found for the submitted questions".to_string(),
        ));
    }

    // 4. Score
    let outcome = calculate_score(&answers, &answer_keys);

    // 5. Persist at the deterministic key
    let result = ExamResult {
        id: result_key(&room.id, user_id),
        room_id: room.id.clone(),
        category_id: room.category_id.clone(),
        user_id: user_id.to_string(),
        user_email: user_email.to_string(),
        score: outcome.score,
        total_questions: outcome.total,
        answers,
        submitted_at: Utc::now(),
    };
    store.upsert_result(&result).await?;

    tracing::info!(
        "Graded submission {}: {}/{}",
        result.id,
        outcome.score,
        outcome.total
    );

    // 6. Best-effort roster bookkeeping
    let roster = match store
        .mark_submitted(&room.id, user_id, outcome.score, outcome.total)
        .await
    {
        Ok(Some(participant)) => {
            live.publish(ChangeEvent::Participant(participant.clone()));
            RosterUpdate::Updated(participant)
        }
        Ok(None) => {
            tracing::warn!(
                "User {} submitted to room {} without joining; roster not updated",
                user_id,
                room.id
            );
            RosterUpdate::Skipped
        }
        Err(e) => {
            tracing::warn!(
                "Roster update failed for user {} in room {}: {}",
                user_id,
                room.id,
                e
            );
            RosterUpdate::Failed(e.to_string())
        }
    };

    Ok(Graded {
        outcome,
        result,
        roster,
    })
}
