use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::PayoutProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Successful,
    Failed,
}

/// A claimed winner slot. Created inside the allocation write with status
/// PENDING; the payout dispatcher later moves it to exactly one terminal
/// status. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winner {
    #[serde(rename = "_id")]
    pub id: String,
    pub question_id: String,
    pub user_id: String,
    /// 1-based, dense per question, assigned with the counter increment.
    pub position: u32,
    pub amount_awarded: i64,
    pub payment_status: PaymentStatus,
    pub payment_provider: PayoutProvider,
    pub phone_number: String,
    pub payment_reference: Option<String>,
    pub awarded_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}
