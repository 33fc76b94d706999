pub mod cadence;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod ipc;
pub mod merge;
pub mod models;
pub mod store;

pub use cadence::{CadencePolicy, CadenceTracker, NEVER_GENERATED_AGE_SEC};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RecapConfig;
pub use error::{RecapError, StoreError};
pub use generator::{
    create_backend, BackendConfig, FallbackSummaryClient, GeneratedSummary, GenerationRequest,
    GeneratorError, GeneratorSettings, HttpSummaryClient, LocalMergeGenerator, SummaryGenerator,
};
pub use merge::{merge, merge_with, SummaryDocument, RECENT_HEADER, SUMMARY_HEADER};
pub use store::{CadenceStore, StateUpdate, SummaryStore, TranscriptStore};
