//! In-memory stores for the `memory` backend and tests.
//!
//! Each store guards its map with a tokio `Mutex`; holding the guard for the
//! whole read-modify-write gives the same per-session atomicity the Postgres
//! row lock provides, within one process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CadenceStore, StateUpdate, SummaryStore, TranscriptStore};
use crate::error::StoreError;
use crate::models::{
    CadenceState, CadenceVerdict, ConversationTurn, InsertedSummary, Role, SummaryRow,
};

#[derive(Debug, Default)]
pub struct MemoryCadenceStore {
    states: Mutex<HashMap<String, CadenceState>>,
}

impl MemoryCadenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a session's record outright.
    pub async fn put(&self, state: CadenceState) {
        self.states
            .lock()
            .await
            .insert(state.session_id.clone(), state);
    }
}

#[async_trait]
impl CadenceStore for MemoryCadenceStore {
    async fn load(&self, session_id: &str) -> Result<Option<CadenceState>, StoreError> {
        Ok(self.states.lock().await.get(session_id).cloned())
    }

    async fn apply_signal(
        &self,
        session_id: &str,
        apply: &(dyn for<'a> Fn(&'a mut CadenceState) -> CadenceVerdict + Send + Sync),
    ) -> Result<CadenceVerdict, StoreError> {
        let mut states = self.states.lock().await;
        let mut next = states
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| CadenceState::new(session_id));
        let verdict = apply(&mut next);
        states.insert(session_id.to_string(), next);
        Ok(verdict)
    }

    async fn bump_turns(&self, session_id: &str) -> Result<StateUpdate, StoreError> {
        let mut states = self.states.lock().await;
        match states.get_mut(session_id) {
            Some(state) => {
                state.turns_since += 1;
                Ok(StateUpdate::Applied)
            }
            None => Ok(StateUpdate::NotFound),
        }
    }

    async fn clear_lock(&self, session_id: &str) -> Result<StateUpdate, StoreError> {
        let mut states = self.states.lock().await;
        match states.get_mut(session_id) {
            Some(state) => {
                state.lock_until = 0;
                Ok(StateUpdate::Applied)
            }
            None => Ok(StateUpdate::NotFound),
        }
    }

    async fn mark_generated(
        &self,
        session_id: &str,
        version: i64,
        generated_at: i64,
    ) -> Result<StateUpdate, StoreError> {
        let mut states = self.states.lock().await;
        match states.get_mut(session_id) {
            Some(state) => {
                state.turns_since = 0;
                state.assistant_msg_since = 0;
                state.lock_until = 0;
                state.last_generated_at = generated_at;
                state.last_version = version;
                Ok(StateUpdate::Applied)
            }
            None => Ok(StateUpdate::NotFound),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    rows: Mutex<HashMap<String, Vec<SummaryRow>>>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All retained rows for a session, oldest first.
    pub async fn rows(&self, session_id: &str) -> Vec<SummaryRow> {
        self.rows
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn latest(&self, session_id: &str) -> Result<Option<SummaryRow>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(session_id)
            .and_then(|versions| versions.iter().max_by_key(|r| r.version))
            .cloned())
    }

    async fn insert(
        &self,
        session_id: &str,
        text: &str,
        last_message_ts: i64,
        meta: serde_json::Value,
    ) -> Result<InsertedSummary, StoreError> {
        let mut rows = self.rows.lock().await;
        let versions = rows.entry(session_id.to_string()).or_default();
        let version = versions.iter().map(|r| r.version).max().unwrap_or(0) + 1;
        let now = Utc::now();
        let row = SummaryRow {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            version,
            text: text.to_string(),
            last_message_ts,
            meta,
            created_at: now,
            updated_at: now,
        };
        let inserted = InsertedSummary {
            id: row.id,
            version,
            updated_at: now,
        };
        versions.push(row);
        Ok(inserted)
    }

    async fn prune(&self, session_id: &str, keep: usize) -> Result<u64, StoreError> {
        if keep == 0 {
            return Ok(0);
        }
        let mut rows = self.rows.lock().await;
        let Some(versions) = rows.get_mut(session_id) else {
            return Ok(0);
        };
        let before = versions.len();
        versions.sort_by_key(|r| r.version);
        if before > keep {
            versions.drain(..before - keep);
        }
        Ok((before - versions.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTranscriptStore {
    turns: Mutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        timestamp: i64,
    ) -> Result<ConversationTurn, StoreError> {
        let turn = ConversationTurn {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            role,
            text: text.to_string(),
            timestamp,
        };
        self.turns
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(turn)
    }

    async fn list_recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let turns = self.turns.lock().await;
        let mut recent = turns.get(session_id).cloned().unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps.
        recent.sort_by_key(|t| t.timestamp);
        let skip = recent.len().saturating_sub(limit);
        Ok(recent.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_summary_versions_increase_per_session() {
        let store = MemorySummaryStore::new();

        let first = store.insert("s1", "one", 10, serde_json::json!({})).await.unwrap();
        let second = store.insert("s1", "two", 20, serde_json::json!({})).await.unwrap();
        let other = store.insert("s2", "other", 5, serde_json::json!({})).await.unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(other.version, 1, "versions are per session");

        let latest = store.latest("s1").await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.text, "two");
        assert_eq!(latest.last_message_ts, 20);
    }

    #[tokio::test]
    async fn test_prune_keeps_newest_rows() {
        let store = MemorySummaryStore::new();
        for i in 0..6 {
            store
                .insert("s1", &format!("v{}", i + 1), i, serde_json::json!({}))
                .await
                .unwrap();
        }

        let removed = store.prune("s1", 2).await.unwrap();
        assert_eq!(removed, 4);

        let versions: Vec<i64> = store.rows("s1").await.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![5, 6]);

        // Version numbering continues after pruning.
        let next = store.insert("s1", "v7", 99, serde_json::json!({})).await.unwrap();
        assert_eq!(next.version, 7);
    }

    #[tokio::test]
    async fn test_prune_zero_keeps_everything() {
        let store = MemorySummaryStore::new();
        store.insert("s1", "a", 1, serde_json::json!({})).await.unwrap();
        store.insert("s1", "b", 2, serde_json::json!({})).await.unwrap();

        assert_eq!(store.prune("s1", 0).await.unwrap(), 0);
        assert_eq!(store.rows("s1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_transcript_returns_most_recent_oldest_first() {
        let store = MemoryTranscriptStore::new();
        for ts in [30, 10, 20, 40] {
            store
                .append("s1", Role::User, &format!("t{}", ts), ts)
                .await
                .unwrap();
        }

        let recent = store.list_recent("s1", 3).await.unwrap();
        let stamps: Vec<i64> = recent.iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![20, 30, 40]);
    }

    #[tokio::test]
    async fn test_apply_signal_creates_and_persists_mutation() {
        let store = MemoryCadenceStore::new();
        let apply = |state: &mut CadenceState| {
            state.assistant_msg_since += 1;
            state.lock_until = 42;
            CadenceVerdict {
                due_now: true,
                locked: true,
                reason: None,
                turns_since: state.turns_since,
                assistant_msg_since: state.assistant_msg_since,
                age_sec: 0,
            }
        };

        let verdict = store.apply_signal("s1", &apply).await.unwrap();
        assert_eq!(verdict.assistant_msg_since, 1);
        let verdict = store.apply_signal("s1", &apply).await.unwrap();
        assert_eq!(verdict.assistant_msg_since, 2);

        let stored = store.load("s1").await.unwrap().unwrap();
        assert_eq!(stored.assistant_msg_since, 2);
        assert_eq!(stored.lock_until, 42);
    }

    #[tokio::test]
    async fn test_clear_lock_on_missing_state_is_not_found() {
        let store = MemoryCadenceStore::new();
        assert_eq!(store.clear_lock("nope").await.unwrap(), StateUpdate::NotFound);
        assert!(store.load("nope").await.unwrap().is_none(), "must not create state");
    }
}
