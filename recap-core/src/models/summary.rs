use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SummaryRow {
    pub id: Uuid,
    pub session_id: String,
    pub version: i64,
    pub text: String,
    /// Cutoff for the next round: turns at or before this were folded in.
    pub last_message_ts: i64,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertedSummary {
    pub id: Uuid,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}
