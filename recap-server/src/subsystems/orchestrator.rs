//! Generation Orchestrator
//!
//! Runs one regeneration round for a session whose cadence signal returned
//! `due_now && locked`. Every exit path hands the lock back exactly once:
//! `on_generated` after a row is persisted, `release_lock` otherwise.

use std::sync::Arc;

use recap_core::generator::{GeneratedSummary, GenerationRequest, GeneratorError, SummaryGenerator};
use recap_core::models::{CadenceVerdict, ClientTurn};
use recap_core::{CadenceTracker, StoreError, SummaryStore};
use serde::Serialize;
use thiserror::Error;

use crate::subsystems::window::TurnWindowSelector;

#[derive(Error, Debug)]
pub enum RegenerationError {
    #[error("Generator failure: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    /// Fresh generator output.
    Generator,
    /// Generator came back blank; previous text kept verbatim.
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Nothing to write: blank output and no previous summary.
    Empty,
    /// The verdict did not grant the lock to this caller.
    NotEligible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegenerationOutcome {
    Generated {
        version: i64,
        source: SummarySource,
        turns: usize,
        last_message_ts: i64,
    },
    Skipped {
        reason: SkipReason,
    },
}

// ============================================================================
// Text policies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPolicy {
    GeneratedVerbatim,
    PreviousVerbatim,
}

pub const TEXT_POLICY_CHAIN: [TextPolicy; 2] =
    [TextPolicy::GeneratedVerbatim, TextPolicy::PreviousVerbatim];

/// Text chosen for the new row, with the cutoff it carries forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedText {
    pub text: String,
    pub last_message_ts: i64,
    pub source: SummarySource,
}

/// Run one text policy. `None` means "try next".
pub fn apply_text_policy(
    policy: TextPolicy,
    generated: &GeneratedSummary,
    previous: &str,
    cutoff_ts: i64,
    fetched_at: i64,
) -> Option<ResolvedText> {
    match policy {
        TextPolicy::GeneratedVerbatim if !generated.is_blank() => Some(ResolvedText {
            text: generated.text.clone(),
            last_message_ts: fetched_at,
            source: SummarySource::Generator,
        }),
        // Nothing new was folded in, so the cutoff stays put.
        TextPolicy::PreviousVerbatim if !previous.trim().is_empty() => Some(ResolvedText {
            text: previous.to_string(),
            last_message_ts: cutoff_ts,
            source: SummarySource::Previous,
        }),
        _ => None,
    }
}

pub fn resolve_text(
    generated: &GeneratedSummary,
    previous: &str,
    cutoff_ts: i64,
    fetched_at: i64,
) -> Option<ResolvedText> {
    TEXT_POLICY_CHAIN
        .iter()
        .find_map(|&policy| apply_text_policy(policy, generated, previous, cutoff_ts, fetched_at))
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Clone)]
pub struct Orchestrator {
    summaries: Arc<dyn SummaryStore>,
    selector: TurnWindowSelector,
    generator: Arc<dyn SummaryGenerator>,
    tracker: CadenceTracker,
    token_budget: Option<u32>,
    retain: usize,
}

impl Orchestrator {
    pub fn new(
        summaries: Arc<dyn SummaryStore>,
        selector: TurnWindowSelector,
        generator: Arc<dyn SummaryGenerator>,
        tracker: CadenceTracker,
        token_budget: Option<u32>,
        retain: usize,
    ) -> Self {
        Self {
            summaries,
            selector,
            generator,
            tracker,
            token_budget,
            retain,
        }
    }

    pub async fn maybe_regenerate(
        &self,
        session_id: &str,
        verdict: &CadenceVerdict,
        client_turns: Option<&[ClientTurn]>,
    ) -> Result<RegenerationOutcome, RegenerationError> {
        if !verdict.should_generate() {
            return Ok(RegenerationOutcome::Skipped {
                reason: SkipReason::NotEligible,
            });
        }

        let latest = match self.summaries.latest(session_id).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to read latest summary");
                self.release(session_id).await;
                return Err(e.into());
            }
        };
        let (previous, cutoff_ts) = latest
            .map(|row| (row.text, row.last_message_ts))
            .unwrap_or_default();

        // Turns stamped after this instant were not visible to the fetch and
        // must stay above the next round's cutoff.
        let fetched_at = self.tracker.now_ms();
        let window = self
            .selector
            .select_window(session_id, cutoff_ts, client_turns)
            .await;
        let turn_count = window.turns.len();

        let request = GenerationRequest {
            session_id: session_id.to_string(),
            previous_summary: previous,
            turns: window.turns,
            token_budget: self.token_budget,
        };

        let generated = match self.generator.generate(&request).await {
            Ok(generated) => generated,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    backend = self.generator.name(),
                    error = %e,
                    "Summary generation failed"
                );
                self.release(session_id).await;
                return Err(e.into());
            }
        };

        let Some(resolved) =
            resolve_text(&generated, &request.previous_summary, cutoff_ts, fetched_at)
        else {
            tracing::info!(session_id = %session_id, "Generator returned nothing to keep, skipping");
            self.release(session_id).await;
            return Ok(RegenerationOutcome::Skipped {
                reason: SkipReason::Empty,
            });
        };

        let meta = serde_json::json!({
            "source": resolved.source,
            "reason": verdict.reason,
            "turns": turn_count,
            "window": window.policy,
            "backend": self.generator.name(),
        });

        let inserted = match self
            .summaries
            .insert(session_id, &resolved.text, resolved.last_message_ts, meta)
            .await
        {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to persist summary");
                self.release(session_id).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .tracker
            .on_generated(session_id, inserted.version, self.tracker.now_ms())
            .await
        {
            tracing::error!(
                session_id = %session_id,
                version = inserted.version,
                error = %e,
                "Summary persisted but cadence reset failed"
            );
            self.release(session_id).await;
            return Err(e.into());
        }

        if self.retain > 0 {
            match self.summaries.prune(session_id, self.retain).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::debug!(session_id = %session_id, removed, "Pruned old summaries")
                }
                Err(e) => tracing::warn!(session_id = %session_id, error = %e, "Summary prune failed"),
            }
        }

        tracing::info!(
            session_id = %session_id,
            version = inserted.version,
            source = ?resolved.source,
            turns = turn_count,
            "Summary regenerated"
        );

        Ok(RegenerationOutcome::Generated {
            version: inserted.version,
            source: resolved.source,
            turns: turn_count,
            last_message_ts: resolved.last_message_ts,
        })
    }

    /// Best-effort lock release on a failure path; the TTL covers a failed release.
    async fn release(&self, session_id: &str) {
        if let Err(e) = self.tracker.release_lock(session_id).await {
            tracing::error!(session_id = %session_id, error = %e, "Failed to release summary lock");
        }
    }
}
