// src/services/paper.rs

use rand::{Rng, seq::SliceRandom};

use crate::{
    error::{AppError, AppResult},
    models::question::{Category, ExamPaper, PublicQuestion, Question},
    repositories::ExamStore,
};

/// Shuffles the question order and, independently, each question's choices.
///
/// `SliceRandom::shuffle` is a Fisher-Yates shuffle, uniform over all orderings.
pub fn shuffle_questions<R: Rng + ?Sized>(questions: &mut [Question], rng: &mut R) {
    questions.shuffle(rng);
    for question in questions.iter_mut() {
        question.choices.shuffle(rng);
    }
}

/// Strips the answer key. Only id, text and choices leave the server.
pub fn redact(question: Question) -> PublicQuestion {
    PublicQuestion {
        id: question.id,
        text: question.text,
        choices: question.choices,
    }
}

/// Shuffles, optionally caps, and redacts a category's question pool.
pub fn assemble_paper<R: Rng + ?Sized>(
    category: &Category,
    mut questions: Vec<Question>,
    cap: Option<usize>,
    rng: &mut R,
) -> ExamPaper {
    shuffle_questions(&mut questions, rng);
    if let Some(cap) = cap {
        questions.truncate(cap);
    }

    ExamPaper {
        category_display_name: category.name.clone(),
        questions: questions.into_iter().map(redact).collect(),
    }
}

/// Builds a randomized, redacted paper for `category_id`.
///
/// Fails with `NotFound` when the category has no questions. A category
/// without a display row is named by its id, as rooms are.
pub async fn build_exam_paper(
    store: &dyn ExamStore,
    category_id: &str,
    cap: Option<usize>,
) -> AppResult<ExamPaper> {
    let category_id = category_id.trim();
    if category_id.is_empty() {
        return Err(AppError::BadRequest("Category id is required".to_string()));
    }

    let questions = store.questions_by_category(category_id).await?;
    if questions.is_empty() {
        return Err(AppError::NotFound(format!(
            "No questions found for category '{}'",
            category_id
        )));
    }

    // Questions may be tagged with a category that has no display row
    let category = match store.get_category(category_id).await? {
        Some(category) => category,
        None => {
            tracing::warn!("Category {} has questions but no display name", category_id);
            Category {
                id: category_id.to_string(),
                name: category_id.to_string(),
            }
        }
    };

    let paper = assemble_paper(&category, questions, cap, &mut rand::thread_rng());

    tracing::info!(
        "Built exam paper for category {} with {} questions",
        category_id,
        paper.questions.len()
    );

    Ok(paper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::question::Choice, repositories::MemoryStore};
    use rand::{SeedableRng, rngs::StdRng};
    use std::collections::{BTreeSet, HashMap};

    fn sample_questions(n: usize) -> Vec<Question> {
        (1..=n)
            .map(|i| Question {
                id: format!("q{}", i),
                category_id: "M1".to_string(),
                text: format!("Question {}", i),
                choices: (1..=4)
                    .map(|c| Choice {
                        id: format!("a{}", c),
                        text: format!("Choice {}", c),
                    })
                    .collect(),
                correct_answer_id: format!("a{}", (i % 4) + 1),
            })
            .collect()
    }

    fn category() -> Category {
        Category {
            id: "M1".to_string(),
            name: "Motorcycle".to_string(),
        }
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let original = sample_questions(30);
        let mut shuffled = original.clone();
        shuffle_questions(&mut shuffled, &mut StdRng::seed_from_u64(7));

        let before: BTreeSet<_> = original.iter().map(|q| q.id.clone()).collect();
        let after: BTreeSet<_> = shuffled.iter().map(|q| q.id.clone()).collect();
        assert_eq!(before, after);
        assert_eq!(original.len(), shuffled.len());

        let by_id: HashMap<_, _> = original.iter().map(|q| (q.id.clone(), q)).collect();
        for q in &shuffled {
            let source = by_id[&q.id];
            let mut a: Vec<_> = source.choices.iter().map(|c| c.id.clone()).collect();
            let mut b: Vec<_> = q.choices.iter().map(|c| c.id.clone()).collect();
            a.sort();
            b.sort();
            assert_eq!(a, b);
            assert_eq!(q.correct_answer_id, source.correct_answer_id);
        }
    }

    #[test]
    fn test_shuffle_changes_order_for_some_seed() {
        let original = sample_questions(10);
        let moved = (0..20u64).any(|seed| {
            let mut shuffled = original.clone();
            shuffle_questions(&mut shuffled, &mut StdRng::seed_from_u64(seed));
            shuffled != original
        });
        assert!(moved);
    }

    #[test]
    fn test_first_position_is_roughly_uniform() {
        let original = sample_questions(3);
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..3000 {
            let mut shuffled = original.clone();
            shuffle_questions(&mut shuffled, &mut rng);
            *counts.entry(shuffled[0].id.clone()).or_default() += 1;
        }
        for id in ["q1", "q2", "q3"] {
            let n = counts.get(id).copied().unwrap_or(0);
            assert!((800..1200).contains(&n), "{} appeared first {} times", id, n);
        }
    }

    #[test]
    fn test_paper_never_carries_answer_key() {
        let paper = assemble_paper(
            &category(),
            sample_questions(12),
            None,
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(paper.category_display_name, "Motorcycle");
        assert_eq!(paper.questions.len(), 12);

        let json = serde_json::to_value(&paper).unwrap();
        for q in json["questions"].as_array().unwrap() {
            let fields: BTreeSet<_> = q.as_object().unwrap().keys().cloned().collect();
            let expected: BTreeSet<_> = ["id", "text", "choices"].iter().map(|s| s.to_string()).collect();
            assert_eq!(fields, expected);
        }
        assert!(!json.to_string().contains("correct"));
    }

    #[test]
    fn test_cap_truncates_shuffled_pool() {
        let paper = assemble_paper(
            &category(),
            sample_questions(30),
            Some(10),
            &mut StdRng::seed_from_u64(3),
        );
        assert_eq!(paper.questions.len(), 10);

        let uncapped = assemble_paper(
            &category(),
            sample_questions(5),
            Some(10),
            &mut StdRng::seed_from_u64(3),
        );
        assert_eq!(uncapped.questions.len(), 5);
    }

    #[tokio::test]
    async fn test_category_without_display_row_is_named_by_id() {
        let store = MemoryStore::new();
        for question in sample_questions(4) {
            store.upsert_question(&question).await.unwrap();
        }

        let paper = build_exam_paper(&store, "M1", None).await.unwrap();
        assert_eq!(paper.category_display_name, "M1");
        assert_eq!(paper.questions.len(), 4);

        let err = build_exam_paper(&store, "B2", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
