//! Turn ingest and regeneration dispatch.
//!
//! Recording a turn never fails because of summary generation: when a signal
//! wins the lock, generation either runs inline or in a spawned task, and its
//! errors are logged, not returned.

use recap_core::models::{CadenceVerdict, ClientTurn, ConversationTurn, Role};
use recap_core::StoreError;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::context::AppContext;
use crate::subsystems::orchestrator::{Orchestrator, RegenerationOutcome};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to regeneration for one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dispatch", rename_all = "snake_case")]
pub enum Dispatch {
    /// Not due.
    Idle,
    /// Due, but another task holds the lock.
    Contended,
    /// Handed to a background task.
    Spawned,
    Inline {
        outcome: Option<RegenerationOutcome>,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalReceipt {
    pub verdict: CadenceVerdict,
    pub dispatch: Dispatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReceipt {
    pub turn: ConversationTurn,
    /// Present for assistant turns only.
    pub verdict: Option<CadenceVerdict>,
    pub dispatch: Dispatch,
}

fn require_session(session_id: &str) -> Result<(), IngestError> {
    if session_id.trim().is_empty() {
        return Err(IngestError::InvalidInput("session_id is required".to_string()));
    }
    Ok(())
}

/// Append a turn, then feed the cadence tracker.
pub async fn record_turn(
    ctx: &AppContext,
    session_id: &str,
    role: &str,
    text: &str,
    timestamp: Option<i64>,
    client_turns: Option<Vec<ClientTurn>>,
    last_known_version: Option<i64>,
) -> Result<TurnReceipt, IngestError> {
    require_session(session_id)?;

    let role = Role::parse(role);
    let timestamp = timestamp.unwrap_or_else(|| ctx.tracker.now_ms());
    let turn = ctx
        .transcripts
        .append(session_id, role, text, timestamp)
        .await?;

    tracing::debug!(session_id = %session_id, role = role.as_str(), timestamp, "Turn recorded");

    if role == Role::Assistant {
        let receipt =
            signal_assistant_turn(ctx, session_id, last_known_version, client_turns).await?;
        return Ok(TurnReceipt {
            turn,
            verdict: Some(receipt.verdict),
            dispatch: receipt.dispatch,
        });
    }

    // No cadence record yet means no assistant turn yet; nothing to count against.
    ctx.tracker.on_user_turn(session_id).await?;

    Ok(TurnReceipt {
        turn,
        verdict: None,
        dispatch: Dispatch::Idle,
    })
}

/// Signal an assistant turn recorded elsewhere and dispatch regeneration if it won the lock.
pub async fn signal_assistant_turn(
    ctx: &AppContext,
    session_id: &str,
    last_known_version: Option<i64>,
    client_turns: Option<Vec<ClientTurn>>,
) -> Result<SignalReceipt, IngestError> {
    require_session(session_id)?;

    let verdict = ctx
        .tracker
        .on_assistant_turn(session_id, last_known_version)
        .await?;
    let dispatch = dispatch_regeneration(ctx, session_id, &verdict, client_turns).await;

    Ok(SignalReceipt { verdict, dispatch })
}

async fn dispatch_regeneration(
    ctx: &AppContext,
    session_id: &str,
    verdict: &CadenceVerdict,
    client_turns: Option<Vec<ClientTurn>>,
) -> Dispatch {
    if !verdict.should_generate() {
        return if verdict.is_contended() {
            Dispatch::Contended
        } else {
            Dispatch::Idle
        };
    }

    let orchestrator = ctx.orchestrator();

    if !ctx.config.cadence.inline_generation {
        spawn_regeneration(orchestrator, session_id.to_string(), verdict.clone(), client_turns);
        return Dispatch::Spawned;
    }

    match orchestrator
        .maybe_regenerate(session_id, verdict, client_turns.as_deref())
        .await
    {
        Ok(outcome) => Dispatch::Inline {
            outcome: Some(outcome),
            error: None,
        },
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Inline summary generation failed");
            Dispatch::Inline {
                outcome: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Run the orchestrator in the background. The triggering request has already answered.
pub fn spawn_regeneration(
    orchestrator: Orchestrator,
    session_id: String,
    verdict: CadenceVerdict,
    client_turns: Option<Vec<ClientTurn>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match orchestrator
            .maybe_regenerate(&session_id, &verdict, client_turns.as_deref())
            .await
        {
            Ok(RegenerationOutcome::Generated { version, .. }) => {
                tracing::info!(session_id = %session_id, version, "Background summary generation completed")
            }
            Ok(RegenerationOutcome::Skipped { reason }) => {
                tracing::debug!(session_id = %session_id, reason = ?reason, "Background summary generation skipped")
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Background summary generation failed")
            }
        }
    })
}
