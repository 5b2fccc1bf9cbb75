use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod attempt;
pub mod question;
pub mod winner;

/// Per-user points balance. Incremented once per settled attempt;
/// this subsystem never decrements it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsBalance {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}
