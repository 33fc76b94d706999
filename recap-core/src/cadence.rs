//! Cadence Tracker and Lock Coordinator.
//!
//! Decides when a session's rolling summary is due and hands out a
//! time-boxed regeneration lock stored on the session's `CadenceState`.
//!
//! Two trigger rules, OR-ed:
//! - count: `assistant_msg_since >= assistant_trigger_count`
//! - time: a previous generation exists and `age_sec >= time_threshold_secs`
//!
//! The lock is a plain `lock_until` timestamp. Readers treat `lock_until <= now`
//! as unlocked, so a crashed holder never deadlocks a session. There is no
//! renewal: a generation that outlives the TTL may race a second one, which
//! only costs an extra version.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::CadenceConfig;
use crate::error::StoreError;
use crate::models::{CadenceState, CadenceVerdict, TriggerReason};
use crate::store::{CadenceStore, StateUpdate};

/// Age reported for a session that has never been summarized.
/// Matches the largest integer a JSON number can carry exactly.
pub const NEVER_GENERATED_AGE_SEC: i64 = 9_007_199_254_740_991;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadencePolicy {
    pub assistant_trigger_count: i64,
    pub time_threshold_secs: Option<i64>,
    pub lock_ttl_ms: i64,
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self::from(&CadenceConfig::default())
    }
}

impl From<&CadenceConfig> for CadencePolicy {
    fn from(config: &CadenceConfig) -> Self {
        Self {
            assistant_trigger_count: config.assistant_trigger_count as i64,
            time_threshold_secs: config.time_threshold_secs.map(|t| t as i64),
            lock_ttl_ms: config.lock_ttl_ms as i64,
        }
    }
}

fn age_secs(state: &CadenceState, now_ms: i64) -> i64 {
    if state.last_generated_at == 0 {
        return NEVER_GENERATED_AGE_SEC;
    }
    ((now_ms - state.last_generated_at) / 1000).max(0)
}

/// Apply one assistant-turn signal to `state` in place.
///
/// Increments both counters, evaluates the trigger rules, and takes the lock
/// when due and not already held.
pub fn evaluate_signal(state: &mut CadenceState, now_ms: i64, policy: &CadencePolicy) -> CadenceVerdict {
    state.turns_since += 1;
    state.assistant_msg_since += 1;

    let age_sec = age_secs(state, now_ms);

    let count_due = state.assistant_msg_since >= policy.assistant_trigger_count;
    // The never-generated sentinel must not satisfy the time rule.
    let time_due = state.last_generated_at > 0
        && policy
            .time_threshold_secs
            .is_some_and(|threshold| age_sec >= threshold);

    let reason = if count_due {
        Some(TriggerReason::AssistantModulo)
    } else if time_due {
        Some(TriggerReason::Time)
    } else {
        None
    };
    let due_now = reason.is_some();

    let locked = due_now && !state.is_locked(now_ms);
    if locked {
        state.lock_until = now_ms + policy.lock_ttl_ms;
    }

    CadenceVerdict {
        due_now,
        locked,
        reason,
        turns_since: state.turns_since,
        assistant_msg_since: state.assistant_msg_since,
        age_sec,
    }
}

/// Store-backed front end over `evaluate_signal` plus the two lock exits.
///
/// After every `locked = true` verdict exactly one of `release_lock`
/// (failure) or `on_generated` (success) must follow.
#[derive(Clone)]
pub struct CadenceTracker {
    store: Arc<dyn CadenceStore>,
    clock: Arc<dyn Clock>,
    policy: CadencePolicy,
}

impl CadenceTracker {
    pub fn new(store: Arc<dyn CadenceStore>, clock: Arc<dyn Clock>, policy: CadencePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &CadencePolicy {
        &self.policy
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Record an assistant turn and report whether regeneration is due.
    ///
    /// `last_known_version` is informational only.
    pub async fn on_assistant_turn(
        &self,
        session_id: &str,
        last_known_version: Option<i64>,
    ) -> Result<CadenceVerdict, StoreError> {
        let now = self.clock.now_ms();
        let policy = &self.policy;
        let apply = |state: &mut CadenceState| evaluate_signal(state, now, policy);

        let verdict = self.store.apply_signal(session_id, &apply).await?;

        tracing::debug!(
            session_id = %session_id,
            last_known_version = ?last_known_version,
            due_now = verdict.due_now,
            locked = verdict.locked,
            reason = ?verdict.reason,
            assistant_msg_since = verdict.assistant_msg_since,
            "Cadence signal evaluated"
        );
        if verdict.is_contended() {
            tracing::debug!(session_id = %session_id, "Summary due but lock already held");
        }

        Ok(verdict)
    }

    /// Count a user turn against an existing record. Never creates state.
    pub async fn on_user_turn(&self, session_id: &str) -> Result<StateUpdate, StoreError> {
        self.store.bump_turns(session_id).await
    }

    /// Failure exit: drop the lock, keep the counters so the next signal retries.
    pub async fn release_lock(&self, session_id: &str) -> Result<StateUpdate, StoreError> {
        let outcome = self.store.clear_lock(session_id).await?;
        if outcome == StateUpdate::NotFound {
            tracing::debug!(session_id = %session_id, "Release requested for unknown session");
        }
        Ok(outcome)
    }

    /// Success exit: reset counters and clear the lock together.
    /// Only call once the new summary row is durably persisted.
    pub async fn on_generated(
        &self,
        session_id: &str,
        new_version: i64,
        generated_at: i64,
    ) -> Result<StateUpdate, StoreError> {
        let outcome = self
            .store
            .mark_generated(session_id, new_version, generated_at)
            .await?;
        tracing::info!(
            session_id = %session_id,
            version = new_version,
            "Cadence rearmed after summary generation"
        );
        Ok(outcome)
    }

    pub async fn state(&self, session_id: &str) -> Result<Option<CadenceState>, StoreError> {
        self.store.load(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryCadenceStore;

    const T0: i64 = 1_700_000_000_000;

    fn tracker_with(policy: CadencePolicy) -> (CadenceTracker, Arc<ManualClock>, Arc<MemoryCadenceStore>) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryCadenceStore::new());
        let tracker = CadenceTracker::new(store.clone(), clock.clone(), policy);
        (tracker, clock, store)
    }

    #[test]
    fn test_evaluate_fourth_assistant_turn_is_due() {
        let policy = CadencePolicy::default();
        let mut state = CadenceState::new("s1");

        for _ in 0..3 {
            let v = evaluate_signal(&mut state, T0, &policy);
            assert!(!v.due_now);
            assert!(!v.locked);
            assert!(v.reason.is_none());
        }

        let v = evaluate_signal(&mut state, T0, &policy);
        assert!(v.due_now);
        assert!(v.locked);
        assert_eq!(v.reason, Some(TriggerReason::AssistantModulo));
        assert_eq!(state.lock_until, T0 + 15_000);
    }

    #[test]
    fn test_never_generated_sentinel_does_not_fire_time_rule() {
        let policy = CadencePolicy {
            time_threshold_secs: Some(1),
            ..CadencePolicy::default()
        };
        let mut state = CadenceState::new("s1");

        let v = evaluate_signal(&mut state, T0, &policy);
        assert_eq!(v.age_sec, NEVER_GENERATED_AGE_SEC);
        assert!(!v.due_now, "brand-new session must only be due by count");
    }

    #[test]
    fn test_time_rule_fires_after_threshold() {
        let policy = CadencePolicy {
            time_threshold_secs: Some(300),
            ..CadencePolicy::default()
        };
        let mut state = CadenceState::new("s1");
        state.last_generated_at = T0;
        state.last_version = 1;

        let early = evaluate_signal(&mut state, T0 + 299_999, &policy);
        assert!(!early.due_now);
        assert_eq!(early.age_sec, 299);

        let late = evaluate_signal(&mut state, T0 + 300_000, &policy);
        assert!(late.due_now);
        assert_eq!(late.reason, Some(TriggerReason::Time));
        assert!(late.locked);
    }

    #[test]
    fn test_count_rule_reported_when_both_fire() {
        let policy = CadencePolicy {
            time_threshold_secs: Some(10),
            ..CadencePolicy::default()
        };
        let mut state = CadenceState::new("s1");
        state.last_generated_at = T0;
        state.assistant_msg_since = 3;

        let v = evaluate_signal(&mut state, T0 + 60_000, &policy);
        assert_eq!(v.reason, Some(TriggerReason::AssistantModulo));
    }

    #[test]
    fn test_time_rule_disabled_without_threshold() {
        let policy = CadencePolicy::default();
        let mut state = CadenceState::new("s1");
        state.last_generated_at = T0;

        let v = evaluate_signal(&mut state, T0 + 86_400_000, &policy);
        assert!(!v.due_now);
        assert_eq!(v.age_sec, 86_400);
    }

    #[test]
    fn test_held_lock_reports_contention() {
        let policy = CadencePolicy::default();
        let mut state = CadenceState::new("s1");
        state.assistant_msg_since = 10;
        state.lock_until = T0 + 5_000;

        let v = evaluate_signal(&mut state, T0, &policy);
        assert!(v.due_now);
        assert!(!v.locked);
        assert!(v.is_contended());
        assert_eq!(state.lock_until, T0 + 5_000, "existing lock untouched");
    }

    #[tokio::test]
    async fn test_scenario_three_turns_then_due() {
        let (tracker, _clock, _store) = tracker_with(CadencePolicy::default());

        for _ in 0..3 {
            let v = tracker.on_assistant_turn("s1", None).await.unwrap();
            assert!(!v.due_now);
        }
        let v = tracker.on_assistant_turn("s1", Some(0)).await.unwrap();
        assert!(v.due_now);
        assert!(v.locked);
        assert_eq!(v.reason, Some(TriggerReason::AssistantModulo));
        assert_eq!(v.assistant_msg_since, 4);
        assert_eq!(v.turns_since, 4);
    }

    #[tokio::test]
    async fn test_assistant_counter_increases_by_one_until_generation() {
        let (tracker, clock, _store) = tracker_with(CadencePolicy::default());

        let mut previous = 0;
        for _ in 0..7 {
            clock.advance(100);
            let v = tracker.on_assistant_turn("s1", None).await.unwrap();
            assert_eq!(v.assistant_msg_since, previous + 1);
            previous = v.assistant_msg_since;
        }

        tracker.on_generated("s1", 1, clock.now_ms()).await.unwrap();
        let v = tracker.on_assistant_turn("s1", None).await.unwrap();
        assert_eq!(v.assistant_msg_since, 1);
    }

    #[tokio::test]
    async fn test_lock_self_expires_after_ttl() {
        let (tracker, clock, _store) = tracker_with(CadencePolicy::default());

        for _ in 0..4 {
            tracker.on_assistant_turn("s1", None).await.unwrap();
        }
        let held = tracker.on_assistant_turn("s1", None).await.unwrap();
        assert!(held.is_contended());

        clock.advance(15_001);
        let reacquired = tracker.on_assistant_turn("s1", None).await.unwrap();
        assert!(reacquired.due_now);
        assert!(reacquired.locked, "expired lock must be re-acquirable");
    }

    #[tokio::test]
    async fn test_lock_still_held_at_exact_ttl_boundary_minus_one() {
        let (tracker, clock, _store) = tracker_with(CadencePolicy::default());
        for _ in 0..4 {
            tracker.on_assistant_turn("s1", None).await.unwrap();
        }
        clock.advance(14_999);
        let v = tracker.on_assistant_turn("s1", None).await.unwrap();
        assert!(!v.locked);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_signals_acquire_lock_once() {
        let (tracker, _clock, store) = tracker_with(CadencePolicy::default());
        let mut seeded = CadenceState::new("s1");
        seeded.assistant_msg_since = 3;
        seeded.turns_since = 3;
        store.put(seeded).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.on_assistant_turn("s1", None).await.unwrap()
            }));
        }

        let mut locked = 0;
        for handle in handles {
            let verdict = handle.await.unwrap();
            assert!(verdict.due_now);
            if verdict.locked {
                locked += 1;
            }
        }
        assert_eq!(locked, 1, "exactly one concurrent caller may win the lock");

        let state = tracker.state("s1").await.unwrap().unwrap();
        assert_eq!(state.assistant_msg_since, 11, "no lost increments");
    }

    #[tokio::test]
    async fn test_release_and_generated_idempotent_when_unlocked() {
        let (tracker, clock, _store) = tracker_with(CadencePolicy::default());
        tracker.on_assistant_turn("s1", None).await.unwrap();

        assert_eq!(tracker.release_lock("s1").await.unwrap(), StateUpdate::Applied);
        assert_eq!(tracker.release_lock("s1").await.unwrap(), StateUpdate::Applied);

        let now = clock.now_ms();
        tracker.on_generated("s1", 3, now).await.unwrap();
        tracker.on_generated("s1", 3, now).await.unwrap();

        let state = tracker.state("s1").await.unwrap().unwrap();
        assert_eq!(state.lock_until, 0);
        assert_eq!(state.last_version, 3);
        assert_eq!(state.last_generated_at, now);
        assert_eq!(state.assistant_msg_since, 0);
    }

    #[tokio::test]
    async fn test_release_unknown_session_does_not_create_state() {
        let (tracker, _clock, _store) = tracker_with(CadencePolicy::default());
        assert_eq!(tracker.release_lock("ghost").await.unwrap(), StateUpdate::NotFound);
        assert!(tracker.state("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_keeps_counters_for_retry() {
        let (tracker, _clock, _store) = tracker_with(CadencePolicy::default());
        for _ in 0..4 {
            tracker.on_assistant_turn("s1", None).await.unwrap();
        }
        tracker.release_lock("s1").await.unwrap();

        let retry = tracker.on_assistant_turn("s1", None).await.unwrap();
        assert!(retry.locked, "released session re-locks on the next signal");
        assert_eq!(retry.assistant_msg_since, 5);
    }

    #[tokio::test]
    async fn test_user_turn_counts_only_existing_sessions() {
        let (tracker, _clock, _store) = tracker_with(CadencePolicy::default());

        assert_eq!(tracker.on_user_turn("s1").await.unwrap(), StateUpdate::NotFound);
        tracker.on_assistant_turn("s1", None).await.unwrap();
        assert_eq!(tracker.on_user_turn("s1").await.unwrap(), StateUpdate::Applied);

        let state = tracker.state("s1").await.unwrap().unwrap();
        assert_eq!(state.turns_since, 2);
        assert_eq!(state.assistant_msg_since, 1);
    }
}
