use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::Database;

use super::SettlementError;
use crate::models::question::RewardQuestion;

pub const COLLECTION: &str = "reward_questions";

/// Durable record of question configuration and scarcity counters.
///
/// `validate` outside the allocation write is only a fast path; the
/// allocator re-asserts liveness against a freshly read row before any
/// counter mutation.
pub struct QuestionRegistry {
    mongo: Database,
}

impl QuestionRegistry {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub fn collection(&self) -> mongodb::Collection<RewardQuestion> {
        self.mongo.collection(COLLECTION)
    }

    pub async fn find(&self, question_id: &str) -> Result<Option<RewardQuestion>> {
        self.collection()
            .find_one(doc! { "_id": question_id })
            .await
            .context("Failed to query reward_questions collection")
    }

    /// Lifecycle check: `Expired` is read-time (no stored transition),
    /// `Completed` is only ever derived from the winners counter.
    pub fn validate(question: &RewardQuestion, now: DateTime<Utc>) -> Result<(), SettlementError> {
        if !question.is_active {
            return Err(SettlementError::Inactive);
        }
        if question.is_expired(now) {
            return Err(SettlementError::Expired);
        }
        if question.is_completed || question.winners_count >= question.max_winners {
            return Err(SettlementError::Completed);
        }
        Ok(())
    }
}
