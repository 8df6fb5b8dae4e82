// src/models/question.rs

use serde::{Deserialize, Serialize};

/// A certification category (license grade) questions are tagged with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
}

/// Represents a master question of the Question Bank.
/// Immutable once authored; the correct answer id never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub category_id: String,

    /// The prompt text.
    pub text: String,

    /// Answer choices in authored order.
    pub choices: Vec<Choice>,

    /// Id of the single correct choice.
    pub correct_answer_id: String,
}

/// DTO for sending a question to a participant (no answer key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    pub choices: Vec<Choice>,
}

/// A randomized, redacted question set for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPaper {
    pub category_display_name: String,
    pub questions: Vec<PublicQuestion>,
}

/// Correct answer of one question, as read by the Grading Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKey {
    pub question_id: String,
    pub correct_answer_id: String,
}
