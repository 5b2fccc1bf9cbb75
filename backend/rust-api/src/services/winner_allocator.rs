use anyhow::{Context, Result};
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;

use super::points_ledger::PointsLedger;
use super::{question_registry, SettlementError};
use crate::metrics::{ALLOCATION_CONFLICTS_TOTAL, WINNER_SLOTS_CLAIMED_TOTAL};
use crate::models::question::RewardQuestion;
use crate::models::winner::{PaymentStatus, Winner};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

pub const WINNERS_COLLECTION: &str = "winners";

/// Bounded retry budget for lost compare-and-swap races. Exhaustion surfaces
/// a transient `ConcurrentConflict`; the whole submission is safe to retry.
const MAX_CLAIM_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub enum AllocationOutcome {
    /// A slot was claimed; the winner row is committed with status PENDING.
    Won(Winner),
    /// Correct answer but all slots were gone. Points are still credited;
    /// this is a normal outcome, not an error.
    Full,
}

/// The scarcity-safe critical section.
///
/// Slot ownership is decided by a single conditional update on the question
/// document: `winners_count` must still equal the snapshot this request read.
/// MongoDB document-level atomicity guarantees that of N racers holding the
/// same snapshot, exactly one update matches. The losers re-read and retry.
/// No network I/O happens anywhere on this path; payout dispatch consumes the
/// committed winner row by identity, after the claim.
pub struct WinnerAllocator {
    mongo: Database,
}

impl WinnerAllocator {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn questions(&self) -> mongodb::Collection<RewardQuestion> {
        self.mongo.collection(question_registry::COLLECTION)
    }

    fn winners(&self) -> mongodb::Collection<Winner> {
        self.mongo.collection(WINNERS_COLLECTION)
    }

    pub async fn allocate(
        &self,
        question_id: &str,
        user_id: &str,
        points_to_credit: i64,
        phone_number: &str,
    ) -> Result<AllocationOutcome, SettlementError> {
        let ledger = PointsLedger::new(self.mongo.clone());

        for claim_attempt in 1..=MAX_CLAIM_ATTEMPTS {
            // Fresh snapshot each round; this read establishes the value the
            // conditional update is predicated on.
            let question = self
                .questions()
                .find_one(doc! { "_id": question_id })
                .await
                .context("Failed to read question snapshot")?
                .ok_or(SettlementError::NotFound)?;

            let now = Utc::now();
            if !question.is_active {
                return Err(SettlementError::Inactive);
            }
            if question.is_expired(now) {
                return Err(SettlementError::Expired);
            }

            let snapshot = question.winners_count;
            if snapshot >= question.max_winners {
                ledger
                    .credit_once(user_id, question_id, points_to_credit)
                    .await?;
                return Ok(AllocationOutcome::Full);
            }

            let position = snapshot + 1;
            let completes = position >= question.max_winners;

            // Resolved before the claim; a misconfigured question must not
            // consume a slot it can never pay out.
            let payment_provider = question.payment_provider.ok_or_else(|| {
                anyhow::anyhow!("Instant question {} has no payment provider", question_id)
            })?;

            // Compare-and-swap: claim succeeds iff no other claim observed
            // the same snapshot first. is_active re-asserted in the filter.
            let claim = self
                .questions()
                .update_one(
                    doc! {
                        "_id": question_id,
                        "is_active": true,
                        "winners_count": snapshot as i64,
                    },
                    doc! {
                        "$inc": { "winners_count": 1 },
                        "$set": { "is_completed": completes },
                    },
                )
                .await
                .context("Failed to execute conditional winner slot claim")?;

            if claim.modified_count == 0 {
                ALLOCATION_CONFLICTS_TOTAL.inc();
                tracing::debug!(
                    "Lost slot race on question={} (attempt {}/{}), retrying with fresh snapshot",
                    question_id,
                    claim_attempt,
                    MAX_CLAIM_ATTEMPTS
                );
                continue;
            }

            let winner = Winner {
                id: Uuid::new_v4().to_string(),
                question_id: question_id.to_string(),
                user_id: user_id.to_string(),
                position,
                amount_awarded: question.reward_amount,
                payment_status: PaymentStatus::Pending,
                payment_provider,
                phone_number: phone_number.to_string(),
                payment_reference: None,
                awarded_at: now,
                paid_at: None,
            };

            if let Err(e) = self.winners().insert_one(&winner).await {
                // Either way this request over-claimed; give the slot back.
                self.release_claim(question_id).await;

                if super::is_duplicate_key_error(&e) {
                    // A concurrent settlement of the same (user, question)
                    // already holds a slot; converge on its winner row.
                    let existing = self
                        .find_winner(question_id, user_id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("Winner row missing after conflict"))?;
                    ledger
                        .credit_once(user_id, question_id, points_to_credit)
                        .await?;
                    return Ok(AllocationOutcome::Won(existing));
                }

                return Err(SettlementError::Storage(
                    anyhow::Error::new(e).context("Failed to insert winner row"),
                ));
            }

            ledger
                .credit_once(user_id, question_id, points_to_credit)
                .await?;

            WINNER_SLOTS_CLAIMED_TOTAL.inc();
            tracing::info!(
                "Winner slot claimed: question={}, user={}, position={}/{}",
                question_id,
                user_id,
                position,
                question.max_winners
            );
            return Ok(AllocationOutcome::Won(winner));
        }

        tracing::warn!(
            "Claim retry budget exhausted for question={}, user={}",
            question_id,
            user_id
        );
        Err(SettlementError::ConcurrentConflict)
    }

    pub async fn find_winner(&self, question_id: &str, user_id: &str) -> Result<Option<Winner>> {
        self.winners()
            .find_one(doc! { "question_id": question_id, "user_id": user_id })
            .await
            .context("Failed to query winners collection")
    }

    /// A claimed slot with no winner row would leak scarcity; give the slot
    /// back if the winner insert could not land.
    async fn release_claim(&self, question_id: &str) {
        let result = retry_async_with_config(RetryConfig::aggressive(), || async {
            self.questions()
                .update_one(
                    doc! { "_id": question_id },
                    doc! {
                        "$inc": { "winners_count": -1 },
                        "$set": { "is_completed": false },
                    },
                )
                .await
        })
        .await;

        if let Err(e) = result {
            tracing::error!(
                "Failed to release claimed slot on question={}: {:#?}",
                question_id,
                e
            );
        }
    }
}
