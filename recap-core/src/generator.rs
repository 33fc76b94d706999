//! Summary generator backends.
//!
//! Provides a `SummaryGenerator` trait with implementations for:
//! - **HTTP**: the external generation service (`HttpSummaryClient`)
//! - **Local**: deterministic header-based merge, no network (`LocalMergeGenerator`)
//! - **HTTP-fallback-local**: HTTP with graceful degradation to the local merge
//!
//! The HTTP client never retries: a failed generation releases the session
//! lock and the next cadence signal tries again.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::BudgetConfig;
use crate::merge::merge_with;
use crate::models::DialogueTurn;

// ============================================================================
// SummaryGenerator trait
// ============================================================================

/// Input handed to every generator backend.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub session_id: String,
    pub previous_summary: String,
    pub turns: Vec<DialogueTurn>,
    pub token_budget: Option<u32>,
}

/// Generator output. Blank `text` is a valid, non-error answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GeneratedSummary {
    #[serde(default)]
    pub text: String,
}

impl GeneratedSummary {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Abstraction over summary generation providers.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSummary, GeneratorError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Generator endpoint is not configured")]
    MissingEndpoint,
}

// ============================================================================
// Config types
// ============================================================================

/// HTTP generator client configuration
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl GeneratorSettings {
    /// Reads the bearer token from `api_key_env` when set and non-empty.
    pub fn new(endpoint: String, api_key_env: &str, timeout_secs: u64) -> Self {
        let api_key = std::env::var(api_key_env).ok().filter(|k| !k.is_empty());
        Self {
            endpoint,
            api_key,
            timeout_secs,
        }
    }
}

/// Configuration union for the backend factory.
pub enum BackendConfig {
    Http(GeneratorSettings),
    Local(BudgetConfig),
    HttpFallbackLocal(GeneratorSettings, BudgetConfig),
}

/// Create the appropriate backend from configuration.
pub fn create_backend(config: BackendConfig) -> Result<Box<dyn SummaryGenerator>, GeneratorError> {
    match config {
        BackendConfig::Http(s) => Ok(Box::new(HttpSummaryClient::new(s)?)),
        BackendConfig::Local(b) => Ok(Box::new(LocalMergeGenerator::new(b))),
        BackendConfig::HttpFallbackLocal(s, b) => Ok(Box::new(FallbackSummaryClient::new(s, b)?)),
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorDetail {
    Message { message: String },
    Plain(String),
}

impl ApiErrorDetail {
    fn into_message(self) -> String {
        match self {
            ApiErrorDetail::Message { message } => message,
            ApiErrorDetail::Plain(message) => message,
        }
    }
}

// ============================================================================
// HttpSummaryClient
// ============================================================================

/// Calls the external generation service: `POST {endpoint}` with a
/// `GenerationRequest` JSON body, expecting `{"text": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpSummaryClient {
    client: Client,
    settings: GeneratorSettings,
}

impl HttpSummaryClient {
    pub fn new(settings: GeneratorSettings) -> Result<Self, GeneratorError> {
        if settings.endpoint.trim().is_empty() {
            return Err(GeneratorError::MissingEndpoint);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { client, settings })
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }
}

#[async_trait]
impl SummaryGenerator for HttpSummaryClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSummary, GeneratorError> {
        let mut builder = self.client.post(&self.settings.endpoint).json(request);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(ApiErrorDetail::into_message)
                .unwrap_or(error_body);

            tracing::error!(
                code = status.as_u16(),
                message = %message,
                session_id = %request.session_id,
                "Summary generator API error"
            );

            return Err(GeneratorError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let generated: GeneratedSummary = response.json().await?;
        Ok(generated)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// LocalMergeGenerator
// ============================================================================

/// Folds the previous summary and the new turns with the header-based merge.
#[derive(Debug, Clone, Default)]
pub struct LocalMergeGenerator {
    budget: BudgetConfig,
}

impl LocalMergeGenerator {
    pub fn new(budget: BudgetConfig) -> Self {
        Self { budget }
    }

    pub fn merge(&self, request: &GenerationRequest) -> GeneratedSummary {
        GeneratedSummary {
            text: merge_with(
                &request.previous_summary,
                &request.turns,
                request.token_budget,
                &self.budget,
            ),
        }
    }
}

#[async_trait]
impl SummaryGenerator for LocalMergeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSummary, GeneratorError> {
        Ok(self.merge(request))
    }

    fn name(&self) -> &str {
        "local"
    }
}

// ============================================================================
// FallbackSummaryClient
// ============================================================================

/// Wraps `HttpSummaryClient`. On any error, logs a warning and answers with
/// the local merge instead.
pub struct FallbackSummaryClient {
    inner: HttpSummaryClient,
    local: LocalMergeGenerator,
}

impl FallbackSummaryClient {
    pub fn new(settings: GeneratorSettings, budget: BudgetConfig) -> Result<Self, GeneratorError> {
        Ok(Self {
            inner: HttpSummaryClient::new(settings)?,
            local: LocalMergeGenerator::new(budget),
        })
    }
}

#[async_trait]
impl SummaryGenerator for FallbackSummaryClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSummary, GeneratorError> {
        match self.inner.generate(request).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    session_id = %request.session_id,
                    "Summary generator failed, falling back to local merge"
                );
                Ok(self.local.merge(request))
            }
        }
    }

    fn name(&self) -> &str {
        "http-fallback-local"
    }
}

// ============================================================================
// TESTS
// ============================================================================
