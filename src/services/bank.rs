// src/services/bank.rs

use std::{collections::HashSet, path::Path};

use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::question::{Category, Question},
    repositories::ExamStore,
};

/// Seed file layout: `{ "categories": [...], "questions": [...] }`.
#[derive(Debug, Deserialize)]
pub struct QuestionBankSeed {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl QuestionBankSeed {
    /// Every question must have choices and a correct answer among them.
    pub fn validate(&self) -> AppResult<()> {
        for q in &self.questions {
            let ids: HashSet<&str> = q.choices.iter().map(|c| c.id.as_str()).collect();
            if ids.len() != q.choices.len() {
                return Err(AppError::BadRequest(format!(
                    "Question '{}' has duplicate choice ids",
                    q.id
                )));
            }
            if !ids.contains(q.correct_answer_id.as_str()) {
                return Err(AppError::BadRequest(format!(
                    "Question '{}' has no choice '{}'",
                    q.id, q.correct_answer_id
                )));
            }
        }
        Ok(())
    }
}

/// Loads authored categories and questions into the store.
/// Existing entries with the same ids are replaced.
pub async fn seed_question_bank(store: &dyn ExamStore, seed: &QuestionBankSeed) -> AppResult<()> {
    seed.validate()?;

    for category in &seed.categories {
        store.upsert_category(category).await?;
    }
    for question in &seed.questions {
        store.upsert_question(question).await?;
    }

    tracing::info!(
        "Seeded question bank: {} categories, {} questions",
        seed.categories.len(),
        seed.questions.len()
    );
    Ok(())
}

pub async fn seed_from_file(store: &dyn ExamStore, path: &Path) -> AppResult<()> {
    let raw = tokio::fs::read(path).await?;
    let seed: QuestionBankSeed = serde_json::from_slice(&raw)?;
    seed_question_bank(store, &seed).await
}
