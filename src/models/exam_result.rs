// src/models/exam_result.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deterministic key of a result: one per `(room, user)` pair.
pub fn result_key(room_id: &str, user_id: &str) -> String {
    format!("{}_{}", room_id, user_id)
}

/// Graded outcome of one participant's attempt at one room.
/// Overwriting by the same key is the only mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: String,
    pub room_id: String,
    pub category_id: String,
    pub user_id: String,
    pub user_email: String,
    pub score: u32,
    pub total_questions: u32,
    /// Full submitted answer map, stray ids included.
    pub answers: BTreeMap<String, String>,
    pub submitted_at: DateTime<Utc>,
}

/// Body of `POST /api/exam/{room_id}/submit`.
///
/// Identity and answers share one flat object:
/// `{ "userId": "u1", "userEmail": "s@x.com", "q1": "a2", ... }`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitExamRequest {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    #[serde(flatten)]
    pub answers: BTreeMap<String, Value>,
}

impl SubmitExamRequest {
    /// Answer map with non-scalar values dropped. Numeric answer ids are
    /// accepted and compared by their decimal text.
    pub fn answer_map(&self) -> BTreeMap<String, String> {
        self.answers
            .iter()
            .filter_map(|(question_id, value)| {
                let answer = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((question_id.clone(), answer))
            })
            .collect()
    }
}

/// Score returned to the submitting participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub score: u32,
    pub total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_key_joins_room_and_user() {
        assert_eq!(result_key("R1", "u1"), "R1_u1");
    }

    #[test]
    fn test_submit_request_splits_identity_from_answers() {
        let req: SubmitExamRequest = serde_json::from_value(serde_json::json!({
            "userId": "u1",
            "userEmail": "s@x.com",
            "q1": "a2",
            "q2": 7,
            "q3": ["a1"],
        }))
        .unwrap();

        assert_eq!(req.user_id.as_deref(), Some("u1"));
        assert_eq!(req.user_email.as_deref(), Some("s@x.com"));

        let answers = req.answer_map();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers["q1"], "a2");
        assert_eq!(answers["q2"], "7");
        assert!(!answers.contains_key("userId"));
    }
}
