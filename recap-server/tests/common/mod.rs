//! Shared fixtures for the recap-server integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recap_core::generator::{GeneratedSummary, GenerationRequest, GeneratorError, SummaryGenerator};
use recap_core::models::{ConversationTurn, InsertedSummary, Role, SummaryRow};
use recap_core::store::{MemoryCadenceStore, MemorySummaryStore, MemoryTranscriptStore};
use recap_core::{ManualClock, RecapConfig, StoreError, SummaryStore, TranscriptStore};
use recap_server::context::AppContext;

pub const T0: i64 = 1_700_000_000_000;

pub fn memory_config(extra: &str) -> RecapConfig {
    RecapConfig::from_toml_str(&format!(
        r#"
        [service]
        socket_path = "/tmp/recap-test.sock"
        log_level = "debug"
        store = "memory"

        {}
        "#,
        extra
    ))
    .expect("test config must parse")
}

// ============================================================================
// Scripted generator
// ============================================================================

pub enum Reply {
    Text(String),
    Fail(u16),
}

/// Answers from a queue and remembers every request. An empty queue answers blank.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Reply::Text(text.to_string()));
    }

    pub fn push_failure(&self, code: u16) {
        self.replies.lock().unwrap().push_back(Reply::Fail(code));
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl SummaryGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSummary, GeneratorError> {
        self.seen.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(text)) => Ok(GeneratedSummary { text }),
            Some(Reply::Fail(code)) => Err(GeneratorError::Api {
                code,
                message: "scripted failure".to_string(),
            }),
            None => Ok(GeneratedSummary::default()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Stores with switchable failures
// ============================================================================

#[derive(Default)]
pub struct FlakySummaryStore {
    pub inner: MemorySummaryStore,
    pub fail_latest: AtomicBool,
    pub fail_insert: AtomicBool,
}

impl FlakySummaryStore {
    pub async fn rows(&self, session_id: &str) -> Vec<SummaryRow> {
        self.inner.rows(session_id).await
    }
}

fn unavailable(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{} disabled by test", what))
}

#[async_trait]
impl SummaryStore for FlakySummaryStore {
    async fn latest(&self, session_id: &str) -> Result<Option<SummaryRow>, StoreError> {
        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(unavailable("latest"));
        }
        self.inner.latest(session_id).await
    }

    async fn insert(
        &self,
        session_id: &str,
        text: &str,
        last_message_ts: i64,
        meta: serde_json::Value,
    ) -> Result<InsertedSummary, StoreError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(unavailable("insert"));
        }
        self.inner.insert(session_id, text, last_message_ts, meta).await
    }

    async fn prune(&self, session_id: &str, keep: usize) -> Result<u64, StoreError> {
        self.inner.prune(session_id, keep).await
    }
}

#[derive(Default)]
pub struct FlakyTranscriptStore {
    pub inner: MemoryTranscriptStore,
    pub fail_list: AtomicBool,
}

#[async_trait]
impl TranscriptStore for FlakyTranscriptStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        timestamp: i64,
    ) -> Result<ConversationTurn, StoreError> {
        self.inner.append(session_id, role, text, timestamp).await
    }

    async fn list_recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(unavailable("list_recent"));
        }
        self.inner.list_recent(session_id, limit).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub ctx: AppContext,
    pub clock: Arc<ManualClock>,
    pub cadence: Arc<MemoryCadenceStore>,
    pub summaries: Arc<FlakySummaryStore>,
    pub transcripts: Arc<FlakyTranscriptStore>,
    pub generator: Arc<ScriptedGenerator>,
}

impl Harness {
    pub fn new(extra_config: &str) -> Self {
        Self::with_generator(extra_config, Arc::new(ScriptedGenerator::new()))
    }

    pub fn with_generator(extra_config: &str, generator: Arc<ScriptedGenerator>) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let cadence = Arc::new(MemoryCadenceStore::new());
        let summaries = Arc::new(FlakySummaryStore::default());
        let transcripts = Arc::new(FlakyTranscriptStore::default());

        let ctx = AppContext::from_parts(
            memory_config(extra_config),
            None,
            cadence.clone(),
            summaries.clone(),
            transcripts.clone(),
            generator.clone(),
            clock.clone(),
        );

        Self {
            ctx,
            clock,
            cadence,
            summaries,
            transcripts,
            generator,
        }
    }

    pub async fn add_turn(&self, session_id: &str, role: Role, text: &str, ts: i64) {
        self.transcripts
            .append(session_id, role, text, ts)
            .await
            .expect("append must succeed");
    }
}
