//! Analyzer configuration

use analyzer_lib::inference::InferenceConfig;
use analyzer_lib::pipeline::PipelineConfig;
use analyzer_lib::store::StoreConfig;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Analyzer configuration, loaded from ANALYZER_-prefixed environment
/// variables
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Index store address
    #[serde(default = "default_elasticsearch_url")]
    pub elasticsearch_url: String,

    /// Inference service address
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model identifier passed to the inference service
    #[serde(default = "default_model")]
    pub model: String,

    /// Index pattern holding raw ingested logs
    #[serde(default = "default_log_index_pattern")]
    pub log_index_pattern: String,

    /// Index receiving threat documents
    #[serde(default = "default_threat_index")]
    pub threat_index: String,

    /// Source tag stamped onto every threat document
    #[serde(default = "default_source_tag")]
    pub source_tag: String,

    /// Poll interval between cycles in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Bounded startup connectivity attempts against the store
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,

    /// Delay between startup attempts in seconds
    #[serde(default = "default_startup_retry")]
    pub startup_retry_secs: u64,
}

fn default_elasticsearch_url() -> String {
    "http://elasticsearch:9200".to_string()
}

fn default_ollama_url() -> String {
    "http://ollama:11434".to_string()
}

fn default_model() -> String {
    "phi3:mini".to_string()
}

fn default_log_index_pattern() -> String {
    "logs-*".to_string()
}

fn default_threat_index() -> String {
    "ai-threats".to_string()
}

fn default_source_tag() -> String {
    "nginx".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_api_port() -> u16 {
    8080
}

fn default_startup_attempts() -> u32 {
    10
}

fn default_startup_retry() -> u64 {
    5
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            elasticsearch_url: default_elasticsearch_url(),
            ollama_url: default_ollama_url(),
            model: default_model(),
            log_index_pattern: default_log_index_pattern(),
            threat_index: default_threat_index(),
            source_tag: default_source_tag(),
            poll_interval_secs: default_poll_interval(),
            api_port: default_api_port(),
            startup_attempts: default_startup_attempts(),
            startup_retry_secs: default_startup_retry(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ANALYZER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            endpoint: self.elasticsearch_url.clone(),
            log_index_pattern: self.log_index_pattern.clone(),
            threat_index: self.threat_index.clone(),
            ..StoreConfig::default()
        }
    }

    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            endpoint: self.ollama_url.clone(),
            model: self.model.clone(),
            ..InferenceConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let poll_interval = Duration::from_secs(self.poll_interval_secs);
        PipelineConfig {
            poll_interval,
            backoff: poll_interval * 2,
            source_tag: self.source_tag.clone(),
        }
    }
}
