//! Shared application context: config, stores, tracker, and generator.

use std::sync::Arc;

use anyhow::Context as _;
use recap_core::config::StoreBackend;
use recap_core::store::{
    MemoryCadenceStore, MemorySummaryStore, MemoryTranscriptStore, PgStore,
};
use recap_core::{
    CadencePolicy, CadenceStore, CadenceTracker, Clock, RecapConfig, SummaryGenerator,
    SummaryStore, SystemClock, TranscriptStore,
};
use sqlx::PgPool;

use crate::subsystems::generator::create_backend_from_config;
use crate::subsystems::orchestrator::Orchestrator;
use crate::subsystems::window::TurnWindowSelector;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<RecapConfig>,
    /// `None` for the in-memory store backend.
    pub pool: Option<PgPool>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub summaries: Arc<dyn SummaryStore>,
    pub tracker: CadenceTracker,
    pub generator: Arc<dyn SummaryGenerator>,
}

impl AppContext {
    /// Build from config: connect and migrate Postgres, or start empty in-memory stores.
    pub async fn connect(config: RecapConfig) -> anyhow::Result<Self> {
        let generator: Arc<dyn SummaryGenerator> = Arc::from(
            create_backend_from_config(&config).context("Failed to create summary generator")?,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        match config.service.store {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory stores; state is lost on restart");
                Ok(Self::in_memory(config, generator, clock))
            }
            StoreBackend::Postgres => {
                let pool = recap_core::db::create_pool(&config.database)
                    .await
                    .context("Failed to connect to database")?;
                recap_core::db::run_migrations(&pool)
                    .await
                    .context("Failed to run migrations")?;

                let store = Arc::new(PgStore::new(pool.clone()));
                Ok(Self::from_parts(
                    config,
                    Some(pool),
                    store.clone(),
                    store.clone(),
                    store,
                    generator,
                    clock,
                ))
            }
        }
    }

    pub fn in_memory(
        config: RecapConfig,
        generator: Arc<dyn SummaryGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_parts(
            config,
            None,
            Arc::new(MemoryCadenceStore::new()),
            Arc::new(MemorySummaryStore::new()),
            Arc::new(MemoryTranscriptStore::new()),
            generator,
            clock,
        )
    }

    pub fn from_parts(
        config: RecapConfig,
        pool: Option<PgPool>,
        cadence: Arc<dyn CadenceStore>,
        summaries: Arc<dyn SummaryStore>,
        transcripts: Arc<dyn TranscriptStore>,
        generator: Arc<dyn SummaryGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tracker = CadenceTracker::new(cadence, clock, CadencePolicy::from(&config.cadence));
        Self {
            config: Arc::new(config),
            pool,
            transcripts,
            summaries,
            tracker,
            generator,
        }
    }

    pub fn window_selector(&self) -> TurnWindowSelector {
        TurnWindowSelector::new(self.transcripts.clone(), self.config.window.clone())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.summaries.clone(),
            self.window_selector(),
            self.generator.clone(),
            self.tracker.clone(),
            self.config.budget.token_budget,
            self.config.summaries.retain,
        )
    }

    pub fn store_name(&self) -> &'static str {
        match self.config.service.store {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        }
    }
}
