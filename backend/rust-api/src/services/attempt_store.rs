use anyhow::{Context, Result};
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;

use super::{is_duplicate_key_error, SettlementError};
use crate::models::attempt::Attempt;

pub const COLLECTION: &str = "attempts";

/// Durable record of answer attempts; the idempotency gate.
///
/// The unique (user_id, question_id) index is the authority: recording is a
/// bare insert, and the duplicate key error is the signal that the user has
/// already answered. No read-before-write, since that admits a race where two
/// concurrent submissions from the same user both pass the check.
pub struct AttemptStore {
    mongo: Database,
}

impl AttemptStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> mongodb::Collection<Attempt> {
        self.mongo.collection(COLLECTION)
    }

    /// Records the attempt, or fails with `AlreadyAttempted` if one exists.
    /// `is_correct` and the points awarded are computed at write time and
    /// immutable thereafter, so replays never recompute the outcome.
    pub async fn record(
        &self,
        user_id: &str,
        question_id: &str,
        selected_answer: &str,
        is_correct: bool,
        points_awarded: i64,
    ) -> Result<Attempt, SettlementError> {
        let attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            question_id: question_id.to_string(),
            selected_answer: selected_answer.to_string(),
            is_correct,
            points_awarded,
            attempted_at: Utc::now(),
        };

        match self.collection().insert_one(&attempt).await {
            Ok(_) => {
                tracing::info!(
                    "Attempt recorded: user={}, question={}, correct={}",
                    user_id,
                    question_id,
                    is_correct
                );
                Ok(attempt)
            }
            Err(e) if is_duplicate_key_error(&e) => {
                tracing::info!(
                    "Duplicate attempt rejected by unique index: user={}, question={}",
                    user_id,
                    question_id
                );
                Err(SettlementError::AlreadyAttempted)
            }
            Err(e) => Err(SettlementError::Storage(
                anyhow::Error::new(e).context("Failed to insert attempt"),
            )),
        }
    }

    /// Read-after-conflict path: fetch the stored attempt so the caller can
    /// return the original outcome instead of erroring.
    pub async fn find(&self, user_id: &str, question_id: &str) -> Result<Option<Attempt>> {
        self.collection()
            .find_one(doc! { "user_id": user_id, "question_id": question_id })
            .await
            .context("Failed to query attempts collection")
    }
}
