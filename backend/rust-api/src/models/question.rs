use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mobile-money providers supported for instant payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayoutProvider {
    Mtn,
    Airtel,
}

impl std::fmt::Display for PayoutProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutProvider::Mtn => write!(f, "MTN"),
            PayoutProvider::Airtel => write!(f, "AIRTEL"),
        }
    }
}

/// A reward question as stored in the `reward_questions` collection.
///
/// `winners_count` and `is_completed` are mutated only by the winner
/// allocator's conditional update; `is_completed` is always derived from
/// `winners_count >= max_winners` and never set independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardQuestion {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub reward_amount: i64,
    pub is_instant_reward: bool,
    pub max_winners: u32,
    pub winners_count: u32,
    pub is_completed: bool,
    pub is_active: bool,
    pub expiry_time: Option<DateTime<Utc>>,
    pub payment_provider: Option<PayoutProvider>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RewardQuestion {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time.is_some_and(|expiry| now > expiry)
    }

    /// Spots still open as of the last read; never negative.
    pub fn remaining_spots(&self) -> u32 {
        self.max_winners.saturating_sub(self.winners_count)
    }
}

/// Public view of a question: what answerers see (no correct answer).
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub reward_amount: i64,
    pub is_instant_reward: bool,
    pub max_winners: u32,
    pub remaining_spots: u32,
    pub is_completed: bool,
    pub is_active: bool,
    pub expiry_time: Option<DateTime<Utc>>,
}

impl From<RewardQuestion> for QuestionView {
    fn from(q: RewardQuestion) -> Self {
        let remaining_spots = q.remaining_spots();
        Self {
            id: q.id,
            text: q.text,
            options: q.options,
            reward_amount: q.reward_amount,
            is_instant_reward: q.is_instant_reward,
            max_winners: q.max_winners,
            remaining_spots,
            is_completed: q.is_completed,
            is_active: q.is_active,
            expiry_time: q.expiry_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn question() -> RewardQuestion {
        RewardQuestion {
            id: "q1".to_string(),
            text: "2 + 2 = ?".to_string(),
            options: vec!["3".to_string(), "4".to_string()],
            correct_answer: "4".to_string(),
            reward_amount: 5000,
            is_instant_reward: true,
            max_winners: 3,
            winners_count: 1,
            is_completed: false,
            is_active: true,
            expiry_time: None,
            payment_provider: Some(PayoutProvider::Mtn),
            phone_number: Some("256700000000".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn remaining_spots_never_negative() {
        let mut q = question();
        assert_eq!(q.remaining_spots(), 2);
        q.winners_count = 5; // over-count should clamp, not underflow
        assert_eq!(q.remaining_spots(), 0);
    }

    #[test]
    fn expiry_is_read_time() {
        let mut q = question();
        let now = Utc::now();
        assert!(!q.is_expired(now));
        q.expiry_time = Some(now - Duration::minutes(1));
        assert!(q.is_expired(now));
        q.expiry_time = Some(now + Duration::minutes(1));
        assert!(!q.is_expired(now));
    }

    #[test]
    fn provider_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&PayoutProvider::Mtn).unwrap(),
            "\"MTN\""
        );
        assert_eq!(
            serde_json::to_string(&PayoutProvider::Airtel).unwrap(),
            "\"AIRTEL\""
        );
    }
}
