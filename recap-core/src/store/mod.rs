//! Storage seams for cadence state, summary rows, and conversation turns.
//!
//! Every trait has a Postgres implementation (`PgStore`) for production and
//! an in-memory one for the `memory` store backend and tests.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{CadenceState, CadenceVerdict, ConversationTurn, InsertedSummary, Role, SummaryRow};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCadenceStore, MemorySummaryStore, MemoryTranscriptStore};
pub use postgres::PgStore;

/// Outcome of an update that never creates a missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    Applied,
    NotFound,
}

/// One mutable cadence record per session.
#[async_trait]
pub trait CadenceStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<CadenceState>, StoreError>;

    /// Load or create the record, run `apply` on it, and persist the result
    /// as a single atomic read-modify-write. Nothing is persisted on error.
    async fn apply_signal(
        &self,
        session_id: &str,
        apply: &(dyn for<'a> Fn(&'a mut CadenceState) -> CadenceVerdict + Send + Sync),
    ) -> Result<CadenceVerdict, StoreError>;

    /// `turns_since += 1` on an existing record.
    async fn bump_turns(&self, session_id: &str) -> Result<StateUpdate, StoreError>;

    /// `lock_until = 0` on an existing record.
    async fn clear_lock(&self, session_id: &str) -> Result<StateUpdate, StoreError>;

    /// Reset counters, clear the lock, and record the new version in one write.
    async fn mark_generated(
        &self,
        session_id: &str,
        version: i64,
        generated_at: i64,
    ) -> Result<StateUpdate, StoreError>;
}

/// Append-only versioned summaries; consumers only read the newest row.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn latest(&self, session_id: &str) -> Result<Option<SummaryRow>, StoreError>;

    /// Persist a new row with `version = previous + 1`.
    async fn insert(
        &self,
        session_id: &str,
        text: &str,
        last_message_ts: i64,
        meta: serde_json::Value,
    ) -> Result<InsertedSummary, StoreError>;

    /// Delete all but the newest `keep` rows. Returns the number removed.
    async fn prune(&self, session_id: &str, keep: usize) -> Result<u64, StoreError>;
}

/// Conversation turns, owned by the transcript and only read by the summarizer.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        timestamp: i64,
    ) -> Result<ConversationTurn, StoreError>;

    /// Up to `limit` most recent turns, oldest first.
    async fn list_recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;
}
