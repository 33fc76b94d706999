pub mod generator;
pub mod ingest;
pub mod orchestrator;
pub mod window;
