//! Generator subsystem: builds the summary generator the orchestrator calls.

use recap_core::generator::{
    create_backend, BackendConfig, GeneratorError, GeneratorSettings, SummaryGenerator,
};
use recap_core::RecapConfig;

/// Create a summary generator from the application config.
///
/// Reads `[generator] backend` to select `http`, `local`, or `http-fallback-local`.
/// Unknown values fall back to `http`.
pub fn create_backend_from_config(
    config: &RecapConfig,
) -> Result<Box<dyn SummaryGenerator>, GeneratorError> {
    let settings = || {
        GeneratorSettings::new(
            config.generator.endpoint.clone(),
            &config.generator.api_key_env,
            config.generator.timeout_secs,
        )
    };

    let backend_cfg = match config.generator.backend.as_str() {
        "local" => BackendConfig::Local(config.budget.clone()),
        "http-fallback-local" => BackendConfig::HttpFallbackLocal(settings(), config.budget.clone()),
        "http" => BackendConfig::Http(settings()),
        other => {
            tracing::warn!(backend = %other, "Unknown generator backend, using http");
            BackendConfig::Http(settings())
        }
    };

    create_backend(backend_cfg)
}
