use chrono::Utc;
use mongodb::Database;
use redis::aio::ConnectionManager;

use super::attempt_store::AttemptStore;
use super::notification_publisher::NotificationPublisher;
use super::payout_dispatcher::PayoutDispatcher;
use super::points_ledger::PointsLedger;
use super::question_registry::QuestionRegistry;
use super::winner_allocator::{AllocationOutcome, WinnerAllocator};
use super::SettlementError;
use crate::config::Config;
use crate::metrics::record_submission;
use crate::models::attempt::{Attempt, SubmissionResult, SubmitAnswerRequest};
use crate::models::question::RewardQuestion;
use crate::models::winner::{PaymentStatus, Winner};

/// Orchestrates one answer submission end-to-end:
/// attempt record (idempotency gate) -> registry validation -> slot
/// allocation -> background payout dispatch -> background notification.
pub struct SettlementService {
    mongo: Database,
    redis: ConnectionManager,
    http: reqwest::Client,
    config: Config,
}

impl SettlementService {
    pub fn new(
        mongo: Database,
        redis: ConnectionManager,
        http: reqwest::Client,
        config: Config,
    ) -> Self {
        Self {
            mongo,
            redis,
            http,
            config,
        }
    }

    pub async fn submit_answer(
        &self,
        question_id: &str,
        user_id: &str,
        req: &SubmitAnswerRequest,
    ) -> Result<SubmissionResult, SettlementError> {
        tracing::info!(
            "Processing answer submission: question={}, user={}",
            question_id,
            user_id
        );

        let registry = QuestionRegistry::new(self.mongo.clone());
        let attempts = AttemptStore::new(self.mongo.clone());
        let now = Utc::now();

        let question = registry
            .find(question_id)
            .await?
            .ok_or(SettlementError::NotFound)?;

        // Replay fast path: an attempted question returns its original
        // outcome even after the question later expired or completed.
        if let Some(existing) = attempts.find(user_id, question_id).await? {
            return self.replay(&question, existing, req).await;
        }

        // Fast-path lifecycle check; the allocator re-asserts liveness
        // against a fresh row before any counter mutation.
        QuestionRegistry::validate(&question, now)?;

        let is_correct = req.selected_answer.trim() == question.correct_answer.trim();
        let points_to_credit = if is_correct {
            question.reward_amount / self.config.points_divisor
        } else {
            0
        };

        // The unique index decides; a concurrent duplicate lands here too.
        let attempt = match attempts
            .record(
                user_id,
                question_id,
                &req.selected_answer,
                is_correct,
                points_to_credit,
            )
            .await
        {
            Ok(a) => a,
            Err(SettlementError::AlreadyAttempted) => {
                let existing = attempts
                    .find(user_id, question_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Attempt row missing after conflict"))?;
                return self.replay(&question, existing, req).await;
            }
            Err(e) => return Err(e),
        };

        record_submission(is_correct);

        if !is_correct {
            self.notify(
                user_id,
                "answer_result",
                serde_json::json!({ "question_id": question_id, "is_correct": false }),
            );
            return Ok(Self::incorrect_result(&question));
        }

        if !question.is_instant_reward {
            // Non-instant questions have no scarce slots; points only.
            let ledger = PointsLedger::new(self.mongo.clone());
            ledger
                .credit_once(user_id, question_id, points_to_credit)
                .await
                .map_err(SettlementError::Storage)?;

            self.notify(
                user_id,
                "answer_result",
                serde_json::json!({
                    "question_id": question_id,
                    "is_correct": true,
                    "points_awarded": points_to_credit,
                }),
            );
            return Ok(Self::points_only_result(&question, points_to_credit));
        }

        let phone_number = req
            .phone_number
            .as_deref()
            .or(question.phone_number.as_deref())
            .ok_or_else(|| anyhow::anyhow!("No payout destination for question {}", question_id))?
            .to_string();

        let allocator = WinnerAllocator::new(self.mongo.clone());
        match allocator
            .allocate(question_id, user_id, points_to_credit, &phone_number)
            .await?
        {
            AllocationOutcome::Won(winner) => {
                self.spawn_payout(winner.clone());
                self.notify(
                    user_id,
                    "instant_win",
                    serde_json::json!({
                        "question_id": question_id,
                        "position": winner.position,
                        "reward_amount": winner.amount_awarded,
                    }),
                );
                Ok(Self::winner_result(&question, &attempt, &winner))
            }
            AllocationOutcome::Full => {
                self.notify(
                    user_id,
                    "answer_result",
                    serde_json::json!({
                        "question_id": question_id,
                        "is_correct": true,
                        "is_winner": false,
                        "points_awarded": points_to_credit,
                    }),
                );
                Ok(Self::full_result(points_to_credit))
            }
        }
    }

    /// Idempotent replay: the stored attempt (and winner row, if any) is the
    /// outcome. The answer is never recomputed and points are never credited
    /// twice. A correct instant attempt with no winner row means the
    /// original request never finished settling (crash, conflict); the
    /// replay converges it before answering.
    async fn replay(
        &self,
        question: &RewardQuestion,
        attempt: Attempt,
        req: &SubmitAnswerRequest,
    ) -> Result<SubmissionResult, SettlementError> {
        tracing::info!(
            "Returning stored outcome for replayed submission: question={}, user={}",
            question.id,
            attempt.user_id
        );

        let allocator = WinnerAllocator::new(self.mongo.clone());
        let mut winner = allocator.find_winner(&question.id, &attempt.user_id).await?;

        if winner.is_none() && attempt.is_correct {
            if question.is_instant_reward {
                let phone_number = req
                    .phone_number
                    .as_deref()
                    .or(question.phone_number.as_deref());
                if let Some(phone_number) = phone_number {
                    match allocator
                        .allocate(
                            &question.id,
                            &attempt.user_id,
                            attempt.points_awarded,
                            phone_number,
                        )
                        .await
                    {
                        Ok(AllocationOutcome::Won(w)) => {
                            self.spawn_payout(w.clone());
                            winner = Some(w);
                        }
                        Ok(AllocationOutcome::Full) => {}
                        Err(SettlementError::ConcurrentConflict) => {
                            return Err(SettlementError::ConcurrentConflict);
                        }
                        Err(e) => {
                            // Lifecycle moved on; the stored outcome stands
                            tracing::debug!(
                                "Replay settlement not applicable for question={}: {}",
                                question.id,
                                e
                            );
                        }
                    }
                }
            } else {
                let ledger = PointsLedger::new(self.mongo.clone());
                ledger
                    .credit_once(&attempt.user_id, &question.id, attempt.points_awarded)
                    .await
                    .map_err(SettlementError::Storage)?;
            }
        }

        let now = Utc::now();
        Ok(SubmissionResult {
            is_correct: attempt.is_correct,
            is_winner: winner.is_some(),
            position: winner.as_ref().map(|w| w.position),
            points_awarded: attempt.points_awarded,
            reward_earned: winner.as_ref().map(|w| w.amount_awarded).unwrap_or(0),
            payment_status: winner.as_ref().map(|w| w.payment_status),
            payment_reference: winner.as_ref().and_then(|w| w.payment_reference.clone()),
            remaining_spots: question.remaining_spots(),
            already_attempted: true,
            is_expired: question.is_expired(now),
            is_completed: question.is_completed,
        })
    }

    /// Payout runs after the allocation commit, never inside it. The spawned
    /// task owns its own handles; the submission response does not wait.
    fn spawn_payout(&self, winner: Winner) {
        let dispatcher = PayoutDispatcher::new(self.mongo.clone(), self.http.clone(), &self.config);

        tokio::spawn(async move {
            match dispatcher.dispatch(&winner).await {
                Ok(status) => {
                    tracing::info!(
                        "Payout dispatch finished: winner={}, status={:?}",
                        winner.id,
                        status
                    );
                }
                Err(e) => {
                    // Winner stays PENDING for later reconciliation
                    tracing::error!("Payout dispatch errored: winner={}: {:#}", winner.id, e);
                }
            }
        });
    }

    fn notify(&self, user_id: &str, event_type: &str, payload: serde_json::Value) {
        let publisher = NotificationPublisher::new(self.redis.clone());
        let user_id = user_id.to_string();
        let event_type = event_type.to_string();

        tokio::spawn(async move {
            publisher
                .publish_best_effort(&user_id, &event_type, payload)
                .await;
        });
    }

    fn incorrect_result(question: &RewardQuestion) -> SubmissionResult {
        SubmissionResult {
            is_correct: false,
            is_winner: false,
            position: None,
            points_awarded: 0,
            reward_earned: 0,
            payment_status: None,
            payment_reference: None,
            remaining_spots: question.remaining_spots(),
            already_attempted: false,
            is_expired: false,
            is_completed: question.is_completed,
        }
    }

    fn points_only_result(question: &RewardQuestion, points: i64) -> SubmissionResult {
        SubmissionResult {
            is_correct: true,
            is_winner: false,
            position: None,
            points_awarded: points,
            reward_earned: 0,
            payment_status: None,
            payment_reference: None,
            remaining_spots: question.remaining_spots(),
            already_attempted: false,
            is_expired: false,
            is_completed: question.is_completed,
        }
    }

    fn winner_result(
        question: &RewardQuestion,
        attempt: &Attempt,
        winner: &Winner,
    ) -> SubmissionResult {
        SubmissionResult {
            is_correct: true,
            is_winner: true,
            position: Some(winner.position),
            points_awarded: attempt.points_awarded,
            reward_earned: winner.amount_awarded,
            payment_status: Some(PaymentStatus::Pending),
            payment_reference: None,
            remaining_spots: question.max_winners.saturating_sub(winner.position),
            already_attempted: false,
            is_expired: false,
            is_completed: winner.position >= question.max_winners,
        }
    }

    fn full_result(points: i64) -> SubmissionResult {
        SubmissionResult {
            is_correct: true,
            is_winner: false,
            position: None,
            points_awarded: points,
            reward_earned: 0,
            payment_status: None,
            payment_reference: None,
            remaining_spots: 0,
            already_attempted: false,
            is_expired: false,
            is_completed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_result_reports_no_spots() {
        let result = SettlementService::full_result(500);
        assert!(result.is_correct);
        assert!(!result.is_winner);
        assert_eq!(result.points_awarded, 500);
        assert_eq!(result.remaining_spots, 0);
        assert!(result.is_completed);
    }
}
