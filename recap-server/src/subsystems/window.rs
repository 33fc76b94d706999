//! Turn Window Selector
//!
//! Picks the dialogue handed to the generator. Policies are tried in order and
//! the first one producing a non-empty normalized window wins:
//!
//! 1. `SinceCutoff`: stored turns newer than the previous summary's cutoff,
//!    capped to the most recent `recent_cap`
//! 2. `ClientProvided`: turns the caller sent along with the signal
//! 3. `RawTail`: last `fallback_tail` stored turns, ignoring the cutoff
//!
//! A transcript fetch failure is logged and treated as an empty fetch, so the
//! chain degrades to policies 2 and 3 instead of failing the pipeline.

use std::sync::Arc;

use recap_core::config::WindowConfig;
use recap_core::models::{ClientTurn, ConversationTurn, DialogueTurn};
use recap_core::TranscriptStore;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    SinceCutoff,
    ClientProvided,
    RawTail,
}

pub const POLICY_CHAIN: [WindowPolicy; 3] = [
    WindowPolicy::SinceCutoff,
    WindowPolicy::ClientProvided,
    WindowPolicy::RawTail,
];

/// Everything the policies look at. `fetched` is oldest-first.
#[derive(Debug, Clone, Copy)]
pub struct WindowInputs<'a> {
    pub fetched: &'a [ConversationTurn],
    pub cutoff_ts: i64,
    pub client_turns: Option<&'a [ClientTurn]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectedWindow {
    pub turns: Vec<DialogueTurn>,
    /// `None` when every policy came up empty.
    pub policy: Option<WindowPolicy>,
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn normalize_stored(turns: &[ConversationTurn]) -> Vec<DialogueTurn> {
    turns.iter().filter_map(DialogueTurn::from_turn).collect()
}

/// Run one policy. `None` means "try next".
pub fn apply_policy(
    policy: WindowPolicy,
    inputs: &WindowInputs<'_>,
    config: &WindowConfig,
) -> Option<Vec<DialogueTurn>> {
    let turns = match policy {
        WindowPolicy::SinceCutoff => {
            let unseen: Vec<ConversationTurn> = inputs
                .fetched
                .iter()
                .filter(|t| t.timestamp > inputs.cutoff_ts)
                .cloned()
                .collect();
            normalize_stored(tail(&unseen, config.recent_cap))
        }
        WindowPolicy::ClientProvided => inputs
            .client_turns?
            .iter()
            .filter_map(DialogueTurn::from_client)
            .collect(),
        WindowPolicy::RawTail => normalize_stored(tail(inputs.fetched, config.fallback_tail)),
    };

    if turns.is_empty() {
        None
    } else {
        Some(turns)
    }
}

/// Walk `POLICY_CHAIN` top-down.
pub fn select_from(inputs: &WindowInputs<'_>, config: &WindowConfig) -> SelectedWindow {
    POLICY_CHAIN
        .iter()
        .find_map(|&policy| {
            apply_policy(policy, inputs, config).map(|turns| SelectedWindow {
                turns,
                policy: Some(policy),
            })
        })
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct TurnWindowSelector {
    transcripts: Arc<dyn TranscriptStore>,
    config: WindowConfig,
}

impl TurnWindowSelector {
    pub fn new(transcripts: Arc<dyn TranscriptStore>, config: WindowConfig) -> Self {
        Self {
            transcripts,
            config,
        }
    }

    /// Never fails; fetch errors degrade through the policy chain.
    pub async fn select_window(
        &self,
        session_id: &str,
        cutoff_ts: i64,
        client_turns: Option<&[ClientTurn]>,
    ) -> SelectedWindow {
        let fetched = match self
            .transcripts
            .list_recent(session_id, self.config.fetch_limit)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Transcript fetch failed, falling back to client turns"
                );
                Vec::new()
            }
        };

        let inputs = WindowInputs {
            fetched: &fetched,
            cutoff_ts,
            client_turns,
        };
        let selected = select_from(&inputs, &self.config);

        tracing::debug!(
            session_id = %session_id,
            cutoff_ts,
            fetched = fetched.len(),
            selected = selected.turns.len(),
            policy = ?selected.policy,
            "Turn window selected"
        );

        selected
    }
}
