use serde::{Deserialize, Serialize};

/// Per-session cadence record. All timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CadenceState {
    pub session_id: String,
    pub turns_since: i64,
    pub assistant_msg_since: i64,
    /// 0 until the first successful generation.
    pub last_generated_at: i64,
    pub last_version: i64,
    /// 0 when unlocked; any value `<= now` is an expired lock.
    pub lock_until: i64,
}

impl CadenceState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns_since: 0,
            assistant_msg_since: 0,
            last_generated_at: 0,
            last_version: 0,
            lock_until: 0,
        }
    }

    pub fn is_locked(&self, now_ms: i64) -> bool {
        self.lock_until > now_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    #[serde(rename = "assistant_modulo")]
    AssistantModulo,
    #[serde(rename = "time")]
    Time,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::AssistantModulo => "assistant_modulo",
            TriggerReason::Time => "time",
        }
    }
}

/// Result of one assistant-turn signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceVerdict {
    pub due_now: bool,
    /// True only when this call acquired the regeneration lock.
    pub locked: bool,
    pub reason: Option<TriggerReason>,
    pub turns_since: i64,
    pub assistant_msg_since: i64,
    pub age_sec: i64,
}

impl CadenceVerdict {
    /// The caller owns the lock and must run the orchestrator.
    pub fn should_generate(&self) -> bool {
        self.due_now && self.locked
    }

    /// Due, but another task already holds the lock.
    pub fn is_contended(&self) -> bool {
        self.due_now && !self.locked
    }
}
