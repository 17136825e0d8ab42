//! HTTP clients for the index store and the analyzer health API

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use url::Url;

/// A threat document as returned by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDoc {
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub log: String,
    pub source: String,
    pub threat: String,
    pub confidence: u8,
    pub evidence: Value,
    pub recommendation: String,
}

/// Analyzer health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: HashMap<String, ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: ThreatDoc,
}

/// Client for querying the threat index
pub struct StoreClient {
    client: Client,
    base_url: Url,
}

impl StoreClient {
    /// Create a new store client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid store URL")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the newest threat documents, optionally filtered by label
    pub async fn list_threats(
        &self,
        index: &str,
        limit: usize,
        threat: Option<&str>,
    ) -> Result<Vec<ThreatDoc>> {
        let query = match threat {
            Some(label) => json!({"term": {"threat": label}}),
            None => json!({"match_all": {}}),
        };
        let body = json!({
            "size": limit,
            "query": query,
            "sort": [{"@timestamp": {"order": "desc"}}]
        });

        let url = self
            .base_url
            .join(&format!("{index}/_search"))
            .context("Invalid index name")?;

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the index store")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Store error ({}): {}", status, body);
        }

        let search: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        Ok(search.hits.hits.into_iter().map(|hit| hit.source).collect())
    }
}

/// Client for the analyzer's health API
pub struct AnalyzerClient {
    client: Client,
    base_url: Url,
}

impl AnalyzerClient {
    /// Create a new analyzer API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid analyzer URL")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the analyzer health report
    ///
    /// An unhealthy analyzer answers 503 with the same body, so the status
    /// code is not treated as an error here.
    pub async fn health(&self) -> Result<HealthReport> {
        let url = self.base_url.join("/healthz").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach the analyzer")?;

        response
            .json()
            .await
            .context("Failed to parse health response")
    }
}
