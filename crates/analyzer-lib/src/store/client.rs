//! HTTP client for an Elasticsearch-compatible index store

use super::{ClaimOutcome, LogStore, PROCESSED_MARKER};
use crate::error::AnalyzerError;
use crate::models::{LogRecord, ThreatDocument};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default request timeout against the store
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the store client
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store base URL (e.g. "http://elasticsearch:9200")
    pub endpoint: String,
    /// Index pattern holding raw ingested logs
    pub log_index_pattern: String,
    /// Index receiving threat documents
    pub threat_index: String,
    /// Request timeout for a single store call
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://elasticsearch:9200".to_string(),
            log_index_pattern: "logs-*".to_string(),
            threat_index: "ai-threats".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Search response envelope, reduced to the fields the selector needs
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
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    result: String,
}

/// Elasticsearch-compatible store client
pub struct EsStore {
    client: Client,
    base_url: Url,
    config: StoreConfig,
}

impl EsStore {
    /// Create a new store client
    pub fn new(config: StoreConfig) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AnalyzerError::Connectivity(format!("failed to build HTTP client: {e}")))?;

        let base_url = Url::parse(&config.endpoint)
            .map_err(|e| AnalyzerError::Connectivity(format!("invalid store endpoint: {e}")))?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn url(&self, path: &str) -> Result<Url, AnalyzerError> {
        self.base_url
            .join(path)
            .map_err(|e| AnalyzerError::Connectivity(format!("invalid store path {path}: {e}")))
    }

    /// Probe store connectivity
    pub async fn ping(&self) -> Result<(), AnalyzerError> {
        let response = self.client.get(self.base_url.clone()).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AnalyzerError::Connectivity(format!(
                "store ping returned {}",
                response.status()
            )))
        }
    }

    /// Ensure the threat index exists with the expected settings and mapping
    ///
    /// Creates the index when absent; otherwise re-applies the mapping so a
    /// pre-existing index picks up new fields.
    pub async fn ensure_threat_index(&self) -> Result<(), AnalyzerError> {
        let index = &self.config.threat_index;
        let exists = self
            .client
            .head(self.url(index)?)
            .send()
            .await?
            .status()
            .is_success();

        if exists {
            let response = self
                .client
                .put(self.url(&format!("{index}/_mapping"))?)
                .json(&super::threat_index_mappings())
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AnalyzerError::Write(format!(
                    "mapping update for '{index}' returned {status}: {body}"
                )));
            }
            debug!(index = %index, "Threat index mapping refreshed");
        } else {
            let response = self
                .client
                .put(self.url(index)?)
                .json(&super::threat_index_body())
                .send()
                .await?;
            // 400 resource_already_exists loses the race to another instance,
            // which leaves the index in the desired state anyway
            if !response.status().is_success() && response.status() != StatusCode::BAD_REQUEST {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AnalyzerError::Write(format!(
                    "index creation for '{index}' returned {status}: {body}"
                )));
            }
            info!(index = %index, "Created threat index with mapping");
        }

        Ok(())
    }
}

#[async_trait]
impl LogStore for EsStore {
    async fn select_candidate(&self) -> Result<Option<LogRecord>, AnalyzerError> {
        let query = json!({
            "size": 1,
            "query": {
                "bool": {
                    "must_not": {
                        "exists": {"field": PROCESSED_MARKER}
                    }
                }
            },
            "sort": [{"@timestamp": {"order": "desc"}}],
            "_source": true
        });

        let response = self
            .client
            .post(self.url(&format!("{}/_search", self.config.log_index_pattern))?)
            .json(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Connectivity(format!(
                "candidate search returned {status}: {body}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Connectivity(format!("malformed search response: {e}")))?;

        Ok(body.hits.hits.into_iter().next().map(|hit| LogRecord {
            index: hit.index,
            id: hit.id,
            source: hit.source,
        }))
    }

    async fn claim(&self, record: &LogRecord) -> Result<ClaimOutcome, AnalyzerError> {
        // Scripted update: no-ops when the marker already exists, which
        // doubles as the contention check.
        let body = json!({
            "script": {
                "lang": "painless",
                "source": format!(
                    "if (ctx._source.containsKey('{m}')) {{ ctx.op = 'noop' }} \
                     else {{ ctx._source.{m} = true }}",
                    m = PROCESSED_MARKER
                )
            }
        });

        let response = self
            .client
            .post(self.url(&format!("{}/_update/{}", record.index, record.id))?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Write(format!(
                "claim update for {}/{} returned {status}: {text}",
                record.index, record.id
            )));
        }

        let update: UpdateResponse = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Write(format!("malformed update response: {e}")))?;

        match update.result.as_str() {
            "noop" => Ok(ClaimOutcome::AlreadyClaimed),
            _ => Ok(ClaimOutcome::Claimed),
        }
    }

    async fn index_threat(&self, document: &ThreatDocument) -> Result<String, AnalyzerError> {
        // refresh=true forces read-after-write visibility so the document is
        // searchable before the call returns
        let mut url = self.url(&format!("{}/_doc", self.config.threat_index))?;
        url.set_query(Some("refresh=true"));

        let response = self.client.post(url).json(document).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Write(format!(
                "threat document write returned {status}: {body}"
            )));
        }

        let body: IndexResponse = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Write(format!("malformed index response: {e}")))?;

        Ok(body.id)
    }
}
