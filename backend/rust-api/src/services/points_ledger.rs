use anyhow::{Context, Result};
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Database;

use super::is_duplicate_key_error;
use crate::models::PointsBalance;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

pub const COLLECTION: &str = "points_balances";
pub const ENTRIES_COLLECTION: &str = "points_entries";

/// Per-user points balance. This subsystem only ever increments it.
///
/// Each credit is keyed by (user, question) through an entry row, so
/// replaying a settlement converges instead of double-crediting.
pub struct PointsLedger {
    mongo: Database,
}

impl PointsLedger {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn balances(&self) -> mongodb::Collection<PointsBalance> {
        self.mongo.collection(COLLECTION)
    }

    fn entries(&self) -> mongodb::Collection<mongodb::bson::Document> {
        self.mongo.collection(ENTRIES_COLLECTION)
    }

    /// Credits `points` at most once per (user, question). Returns whether
    /// this call performed the credit.
    pub async fn credit_once(
        &self,
        user_id: &str,
        question_id: &str,
        points: i64,
    ) -> Result<bool> {
        if points <= 0 {
            return Ok(false);
        }

        let entry = doc! {
            "_id": format!("{}:{}", user_id, question_id),
            "user_id": user_id,
            "question_id": question_id,
            "points": points,
            "created_at": Utc::now().to_rfc3339(),
        };

        match self.entries().insert_one(entry).await {
            Ok(_) => {}
            Err(e) if is_duplicate_key_error(&e) => {
                tracing::debug!(
                    "Points already credited: user={}, question={}",
                    user_id,
                    question_id
                );
                return Ok(false);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context("Failed to insert points entry"));
            }
        }

        let balance = retry_async_with_config(RetryConfig::aggressive(), || async {
            self.balances()
                .find_one_and_update(
                    doc! { "_id": user_id },
                    doc! {
                        "$inc": { "balance": points },
                        "$set": { "updated_at": Utc::now().to_rfc3339() },
                    },
                )
                .upsert(true)
                .return_document(mongodb::options::ReturnDocument::After)
                .await
        })
        .await
        .context("Failed to credit points balance")?;

        tracing::info!(
            "Points credited: user={}, question={}, delta={}, balance={}",
            user_id,
            question_id,
            points,
            balance.map(|b| b.balance).unwrap_or(points)
        );
        Ok(true)
    }

    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        let record = self
            .balances()
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query points balance")?;
        Ok(record.map(|b| b.balance).unwrap_or(0))
    }
}
