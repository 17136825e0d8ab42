//! Index store access for the analysis pipeline
//!
//! This module provides:
//! - Candidate selection (newest log document without the processed marker)
//! - Atomic claim of a selected record before analysis
//! - Verdict persistence into the threat index with read-after-write
//!   visibility
//! - Threat index provisioning for startup bootstrap

mod client;

pub use client::{EsStore, StoreConfig};

use crate::error::AnalyzerError;
use crate::models::{LogRecord, ThreatDocument};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Marker field whose presence on a log document means it was already taken
/// by this pipeline
pub const PROCESSED_MARKER: &str = "processed_by_analyzer";

/// Result of attempting to claim a selected record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The marker was written; this pass owns the record
    Claimed,
    /// The marker was already present; another pass took the record
    AlreadyClaimed,
}

/// Trait for index store implementations, enabling test doubles in the
/// pipeline
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Fetch the single newest log document lacking the processed marker
    ///
    /// Read-only; returns `None` when no unprocessed record exists.
    async fn select_candidate(&self) -> Result<Option<LogRecord>, AnalyzerError>;

    /// Atomically mark the source record as processed
    async fn claim(&self, record: &LogRecord) -> Result<ClaimOutcome, AnalyzerError>;

    /// Write a threat document with immediate visibility, returning the
    /// generated document id
    async fn index_threat(&self, document: &ThreatDocument) -> Result<String, AnalyzerError>;
}

/// Settings and mapping for the threat index, sized for a single-node
/// deployment
pub fn threat_index_body() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": threat_index_mappings()
    })
}

/// Field mapping of the threat document schema
pub fn threat_index_mappings() -> Value {
    json!({
        "properties": {
            "@timestamp": {"type": "date"},
            "log": {"type": "text"},
            "source": {"type": "keyword"},
            "threat": {"type": "keyword"},
            "confidence": {"type": "integer"},
            "evidence": {"type": "object"},
            "recommendation": {"type": "text"}
        }
    })
}
