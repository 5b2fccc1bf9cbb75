use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::winner::PaymentStatus;

/// One answer attempt per (user, question), enforced by a unique compound
/// index rather than a read-then-write check. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    pub selected_answer: String,
    pub is_correct: bool,
    pub points_awarded: i64,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, message = "selected_answer must not be empty"))]
    pub selected_answer: String,
    /// Payout destination override; falls back to the question's default.
    #[validate(length(min = 7, max = 15, message = "phone_number must be 7-15 digits"))]
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub is_correct: bool,
    pub is_winner: bool,
    pub position: Option<u32>,
    pub points_awarded: i64,
    pub reward_earned: i64,
    pub payment_status: Option<PaymentStatus>,
    pub payment_reference: Option<String>,
    pub remaining_spots: u32,
    pub already_attempted: bool,
    pub is_expired: bool,
    pub is_completed: bool,
}
