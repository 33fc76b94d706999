use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CadenceStore, StateUpdate, SummaryStore, TranscriptStore};
use crate::error::StoreError;
use crate::models::{
    CadenceState, CadenceVerdict, ConversationTurn, InsertedSummary, Role, SummaryRow,
};

/// Postgres-backed implementation of every store trait.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn update_outcome(rows_affected: u64) -> StateUpdate {
    if rows_affected == 0 {
        StateUpdate::NotFound
    } else {
        StateUpdate::Applied
    }
}

// ============================================================================
// Cadence state
// ============================================================================

#[async_trait]
impl CadenceStore for PgStore {
    async fn load(&self, session_id: &str) -> Result<Option<CadenceState>, StoreError> {
        let state = sqlx::query_as::<_, CadenceState>(
            r#"
            SELECT session_id, turns_since, assistant_msg_since,
                   last_generated_at, last_version, lock_until
            FROM cadence_state
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn apply_signal(
        &self,
        session_id: &str,
        apply: &(dyn for<'a> Fn(&'a mut CadenceState) -> CadenceVerdict + Send + Sync),
    ) -> Result<CadenceVerdict, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO cadence_state (session_id) VALUES ($1) ON CONFLICT (session_id) DO NOTHING")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        // Row lock serializes concurrent signals for the same session across replicas.
        let mut state = sqlx::query_as::<_, CadenceState>(
            r#"
            SELECT session_id, turns_since, assistant_msg_since,
                   last_generated_at, last_version, lock_until
            FROM cadence_state
            WHERE session_id = $1
            FOR UPDATE
            "#,
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        let verdict = apply(&mut state);

        sqlx::query(
            r#"
            UPDATE cadence_state
            SET turns_since = $2,
                assistant_msg_since = $3,
                last_generated_at = $4,
                last_version = $5,
                lock_until = $6,
                updated_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(state.turns_since)
        .bind(state.assistant_msg_since)
        .bind(state.last_generated_at)
        .bind(state.last_version)
        .bind(state.lock_until)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(verdict)
    }

    async fn bump_turns(&self, session_id: &str) -> Result<StateUpdate, StoreError> {
        let result = sqlx::query(
            "UPDATE cadence_state SET turns_since = turns_since + 1, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(update_outcome(result.rows_affected()))
    }

    async fn clear_lock(&self, session_id: &str) -> Result<StateUpdate, StoreError> {
        let result = sqlx::query(
            "UPDATE cadence_state SET lock_until = 0, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(update_outcome(result.rows_affected()))
    }

    async fn mark_generated(
        &self,
        session_id: &str,
        version: i64,
        generated_at: i64,
    ) -> Result<StateUpdate, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cadence_state
            SET turns_since = 0,
                assistant_msg_since = 0,
                lock_until = 0,
                last_generated_at = $2,
                last_version = $3,
                updated_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(generated_at)
        .bind(version)
        .execute(&self.pool)
        .await?;

        Ok(update_outcome(result.rows_affected()))
    }
}

// ============================================================================
// Summary rows
// ============================================================================

#[async_trait]
impl SummaryStore for PgStore {
    async fn latest(&self, session_id: &str) -> Result<Option<SummaryRow>, StoreError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT id, session_id, version, text, last_message_ts, meta, created_at, updated_at
            FROM session_summaries
            WHERE session_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(
        &self,
        session_id: &str,
        text: &str,
        last_message_ts: i64,
        meta: serde_json::Value,
    ) -> Result<InsertedSummary, StoreError> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        // Serialize version allocation per session for the life of this transaction.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        let (version, updated_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO session_summaries (id, session_id, version, text, last_message_ts, meta)
            SELECT $1, $2, COALESCE(MAX(version), 0) + 1, $3, $4, $5
            FROM session_summaries
            WHERE session_id = $2
            RETURNING version, updated_at
            "#,
        )
        .bind(id)
        .bind(session_id)
        .bind(text)
        .bind(last_message_ts)
        .bind(meta)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(InsertedSummary {
            id,
            version,
            updated_at,
        })
    }

    async fn prune(&self, session_id: &str, keep: usize) -> Result<u64, StoreError> {
        if keep == 0 {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM session_summaries
            WHERE session_id = $1
              AND version <= (
                  SELECT MAX(version) FROM session_summaries WHERE session_id = $1
              ) - $2
            "#,
        )
        .bind(session_id)
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// Conversation turns
// ============================================================================

#[derive(sqlx::FromRow)]
struct TurnRow {
    id: Uuid,
    session_id: String,
    role: String,
    content: String,
    ts: i64,
}

impl From<TurnRow> for ConversationTurn {
    fn from(row: TurnRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            role: Role::parse(&row.role),
            text: row.content,
            timestamp: row.ts,
        }
    }
}

#[async_trait]
impl TranscriptStore for PgStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        timestamp: i64,
    ) -> Result<ConversationTurn, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO session_turns (id, session_id, role, content, ts) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(session_id)
        .bind(role.as_str())
        .bind(text)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(ConversationTurn {
            id,
            session_id: session_id.to_string(),
            role,
            text: text.to_string(),
            timestamp,
        })
    }

    async fn list_recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, role, content, ts FROM (
                SELECT id, session_id, role, content, ts, created_at
                FROM session_turns
                WHERE session_id = $1
                ORDER BY ts DESC, created_at DESC
                LIMIT $2
            ) recent
            ORDER BY ts ASC, created_at ASC
            "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConversationTurn::from).collect())
    }
}
