// src/checkpoint.rs

//! Client-side checkpointing of an in-progress attempt.
//!
//! Each user has one checkpoint slot on local disk. Every edit re-saves the slot
//! before returning, so a reload or crash resumes exactly where the participant
//! left off. The slot is cleared only when the attempt is finished or abandoned.

use std::{
    collections::BTreeMap,
    fs,
    future::Future,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::question::{ExamPaper, PublicQuestion},
};

/// Layout version written into every checkpoint.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Practice,
    Exam,
}

/// The exact question set the participant was served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub quiz_id: String,
    /// Room the attempt will be submitted to, if any.
    pub room_id: Option<String>,
    pub category_display_name: String,
    pub questions: Vec<PublicQuestion>,
}

impl QuizSnapshot {
    pub fn from_paper(quiz_id: &str, room_id: Option<&str>, paper: ExamPaper) -> Self {
        Self {
            quiz_id: quiz_id.to_string(),
            room_id: room_id.map(str::to_string),
            category_display_name: paper.category_display_name,
            questions: paper.questions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub version: u32,
    pub user_id: String,
    pub quiz: QuizSnapshot,
    pub mode: AnswerMode,
    pub answers: BTreeMap<String, String>,
    pub index: usize,
    /// Remaining time budget. Advisory, enforced by the client only.
    pub time_left_secs: Option<u64>,
    pub category_ref: Option<String>,
    pub subtopic_ref: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Body for `POST /api/exam/{room_id}/submit`.
    pub fn submission_body(&self, user_email: &str) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        for (question_id, answer_id) in &self.answers {
            body.insert(question_id.clone(), answer_id.clone().into());
        }
        body.insert("userId".to_string(), self.user_id.clone().into());
        body.insert("userEmail".to_string(), user_email.into());
        serde_json::Value::Object(body)
    }
}

/// One checkpoint file per user under a local directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

/// Maps a user id to a file name. Ids made only of `[A-Za-z0-9_-]` are used as
/// is; anything else is hex-encoded behind a `~`, which plain ids cannot contain.
fn file_stem(user_id: &str) -> String {
    let plain = !user_id.is_empty()
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        user_id.to_string()
    } else {
        let hex: String = user_id.bytes().map(|b| format!("{:02x}", b)).collect();
        format!("~{}", hex)
    }
}

impl CheckpointStore {
    pub fn open(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(user_id)))
    }

    /// Overwrites the user's slot. The file is replaced atomically.
    pub fn save(&self, checkpoint: &Checkpoint) -> AppResult<()> {
        let path = self.path_for(&checkpoint.user_id);
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec(checkpoint)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            "Saved checkpoint for {} at question {}",
            checkpoint.user_id,
            checkpoint.index
        );
        Ok(())
    }

    /// Reads the user's slot. Unreadable or foreign-version records count as absent.
    pub fn load(&self, user_id: &str) -> AppResult<Option<Checkpoint>> {
        let path = self.path_for(user_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!("Ignoring unreadable checkpoint {:?}: {}", path, e);
                return Ok(None);
            }
        };

        if checkpoint.version != CHECKPOINT_VERSION || checkpoint.user_id != user_id {
            tracing::warn!(
                "Ignoring checkpoint {:?} (version {}, user {})",
                path,
                checkpoint.version,
                checkpoint.user_id
            );
            return Ok(None);
        }

        Ok(Some(checkpoint))
    }

    /// Removes the user's slot. Clearing an empty slot is fine.
    pub fn clear(&self, user_id: &str) -> AppResult<()> {
        match fs::remove_file(self.path_for(user_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Active,
    Cleared,
}

/// A participant's attempt, persisted on every edit.
///
/// `none -> active` on [`Attempt::start`] or [`Attempt::resume`], stays `active`
/// through edits, and becomes `cleared` on a successful finish or an abandon.
/// Dropping an attempt leaves its checkpoint in place.
#[derive(Debug)]
pub struct Attempt {
    store: CheckpointStore,
    checkpoint: Checkpoint,
    state: AttemptState,
}

impl Attempt {
    /// Starts a fresh attempt, replacing any stale checkpoint of the user.
    pub fn start(
        store: &CheckpointStore,
        user_id: &str,
        quiz: QuizSnapshot,
        mode: AnswerMode,
        time_left_secs: Option<u64>,
        category_ref: Option<String>,
        subtopic_ref: Option<String>,
    ) -> AppResult<Self> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            user_id: user_id.to_string(),
            quiz,
            mode,
            answers: BTreeMap::new(),
            index: 0,
            time_left_secs,
            category_ref,
            subtopic_ref,
            saved_at: Utc::now(),
        };
        store.save(&checkpoint)?;

        Ok(Self {
            store: store.clone(),
            checkpoint,
            state: AttemptState::Active,
        })
    }

    /// Rebuilds the attempt saved for `user_id`, if there is one.
    pub fn resume(store: &CheckpointStore, user_id: &str) -> AppResult<Option<Self>> {
        Ok(store.load(user_id)?.map(|checkpoint| Self {
            store: store.clone(),
            checkpoint,
            state: AttemptState::Active,
        }))
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    fn persist(&mut self) -> AppResult<()> {
        if self.state == AttemptState::Cleared {
            return Err(AppError::Conflict("Attempt is already finished".to_string()));
        }
        self.checkpoint.saved_at = Utc::now();
        self.store.save(&self.checkpoint)
    }

    pub fn select_answer(&mut self, question_id: &str, answer_id: &str) -> AppResult<()> {
        let question = self
            .checkpoint
            .quiz
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown question '{}'", question_id)))?;
        if !question.choices.iter().any(|c| c.id == answer_id) {
            return Err(AppError::BadRequest(format!(
                "Unknown choice '{}' for question '{}'",
                answer_id, question_id
            )));
        }

        self.checkpoint
            .answers
            .insert(question_id.to_string(), answer_id.to_string());
        self.persist()
    }

    pub fn navigate(&mut self, index: usize) -> AppResult<()> {
        if index >= self.checkpoint.quiz.questions.len() {
            return Err(AppError::BadRequest(format!(
                "Question index {} out of range",
                index
            )));
        }
        self.checkpoint.index = index;
        self.persist()
    }

    /// Records the remaining time budget.
    pub fn tick(&mut self, time_left_secs: u64) -> AppResult<()> {
        self.checkpoint.time_left_secs = Some(time_left_secs);
        self.persist()
    }

    /// Submits the answers through `submit` and clears the checkpoint only if
    /// it succeeds. On failure the attempt stays active and can be retried.
    pub async fn finish<F, Fut, T>(&mut self, submit: F) -> AppResult<T>
    where
        F: FnOnce(Checkpoint) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if self.state == AttemptState::Cleared {
            return Err(AppError::Conflict("Attempt is already finished".to_string()));
        }

        let outcome = submit(self.checkpoint.clone()).await?;
        self.store.clear(&self.checkpoint.user_id)?;
        self.state = AttemptState::Cleared;
        tracing::info!("Attempt of {} finished", self.checkpoint.user_id);
        Ok(outcome)
    }

    /// Gives up the attempt and clears the checkpoint.
    pub fn abandon(self) -> AppResult<()> {
        self.store.clear(&self.checkpoint.user_id)?;
        tracing::info!("Attempt of {} abandoned", self.checkpoint.user_id);
        Ok(())
    }
}
