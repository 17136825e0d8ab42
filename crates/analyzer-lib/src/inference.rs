//! Inference invocation against a local Ollama-compatible service
//!
//! Builds the fixed classification prompt for a log line and calls the
//! `/api/generate` endpoint with near-deterministic sampling. The raw
//! completion text is returned unmodified; repairing and validating it is
//! the extractor's job. No retry happens here, the pipeline runner owns
//! retry policy at the cycle level.

use crate::error::AnalyzerError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Sampling temperature, kept low to minimize output variance
const TEMPERATURE: f64 = 0.1;

/// Default request timeout for a single generate call
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Trait for inference implementations, enabling test doubles in the pipeline
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Ask the model to classify one log line, returning the raw completion
    async fn classify(&self, log_text: &str) -> Result<String, AnalyzerError>;
}

/// Configuration for the Ollama client
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Service base URL (e.g. "http://ollama:11434")
    pub endpoint: String,
    /// Model identifier (e.g. "phi3:mini")
    pub model: String,
    /// Request timeout for a single generate call
    pub request_timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://ollama:11434".to_string(),
            model: "phi3:mini".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// HTTP client for the Ollama generate API
pub struct OllamaClient {
    client: Client,
    generate_url: Url,
    model: String,
}

/// Relevant subset of the generate response body
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    /// Create a new client for the configured service
    pub fn new(config: InferenceConfig) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AnalyzerError::Invocation(format!("failed to build HTTP client: {e}")))?;

        let base = Url::parse(&config.endpoint)
            .map_err(|e| AnalyzerError::Invocation(format!("invalid inference endpoint: {e}")))?;
        let generate_url = base
            .join("/api/generate")
            .map_err(|e| AnalyzerError::Invocation(format!("invalid inference endpoint: {e}")))?;

        Ok(Self {
            client,
            generate_url,
            model: config.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn classify(&self, log_text: &str) -> Result<String, AnalyzerError> {
        let prompt = build_prompt(log_text);

        let response = self
            .client
            .post(self.generate_url.clone())
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": {"temperature": TEMPERATURE},
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Invocation(format!(
                "inference service returned {status}: {body}"
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Invocation(format!("malformed generate response: {e}")))?;

        debug!(completion_len = body.response.len(), "Received model completion");
        Ok(body.response.trim().to_string())
    }
}

/// Build the fixed classification prompt for one log line
///
/// The template instructs the model to return a single JSON object with
/// exactly the four verdict fields; the log text is embedded verbatim.
pub fn build_prompt(log_text: &str) -> String {
    format!(
        "Analyze this log for security threats. Return a SINGLE JSON object with:\n\
         - threat: \"none/malware/phishing/brute_force/sqli/xss\"\n\
         - confidence: 0-100\n\
         - evidence: technical details\n\
         - recommendation: action items\n\
         \n\
         Log: {log_text}"
    )
}
