//! Observability infrastructure for the threat analyzer
//!
//! Provides:
//! - Prometheus metrics (cycle counts, error counts by kind, inference
//!   latency, verdict counts by label)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds); local LLM calls
/// take whole seconds, not milliseconds
const INFERENCE_LATENCY_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AnalyzerMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AnalyzerMetricsInner {
    cycles_total: IntCounter,
    verdicts_indexed_total: IntCounterVec,
    cycle_errors_total: IntCounterVec,
    candidates_skipped_total: IntCounterVec,
    inference_latency_seconds: Histogram,
}

impl AnalyzerMetricsInner {
    fn new() -> Self {
        Self {
            cycles_total: register_int_counter!(
                "threat_analyzer_cycles_total",
                "Total number of completed polling cycles"
            )
            .expect("Failed to register cycles_total"),

            verdicts_indexed_total: register_int_counter_vec!(
                "threat_analyzer_verdicts_indexed_total",
                "Total number of threat documents written, by threat label",
                &["threat"]
            )
            .expect("Failed to register verdicts_indexed_total"),

            cycle_errors_total: register_int_counter_vec!(
                "threat_analyzer_cycle_errors_total",
                "Total number of failed cycles, by error kind",
                &["kind"]
            )
            .expect("Failed to register cycle_errors_total"),

            candidates_skipped_total: register_int_counter_vec!(
                "threat_analyzer_candidates_skipped_total",
                "Total number of selected candidates skipped without analysis",
                &["reason"]
            )
            .expect("Failed to register candidates_skipped_total"),

            inference_latency_seconds: register_histogram!(
                "threat_analyzer_inference_latency_seconds",
                "Wall time of one classify call against the inference service",
                INFERENCE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),
        }
    }
}

/// Analyzer metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AnalyzerMetrics {
    _private: (),
}

impl Default for AnalyzerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalyzerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalyzerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Count one completed polling cycle
    pub fn inc_cycles(&self) {
        self.inner().cycles_total.inc();
    }

    /// Count one persisted verdict
    pub fn inc_verdicts_indexed(&self, threat: &str) {
        self.inner()
            .verdicts_indexed_total
            .with_label_values(&[threat])
            .inc();
    }

    /// Count one failed cycle by error kind
    pub fn inc_cycle_errors(&self, kind: &str) {
        self.inner()
            .cycle_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count one skipped candidate by reason
    pub fn inc_candidates_skipped(&self, reason: &str) {
        self.inner()
            .candidates_skipped_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record the wall time of one classify call
    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for analyzer events
///
/// Provides consistent JSON-formatted logging for verdicts, skips, and
/// lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    source_tag: String,
}

impl StructuredLogger {
    pub fn new(source_tag: impl Into<String>) -> Self {
        Self {
            source_tag: source_tag.into(),
        }
    }

    /// Log analyzer startup
    pub fn log_startup(&self, version: &str, model: &str) {
        info!(
            event = "analyzer_started",
            source = %self.source_tag,
            analyzer_version = %version,
            model = %model,
            "Threat analyzer started"
        );
    }

    /// Log analyzer shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "analyzer_shutdown",
            source = %self.source_tag,
            reason = %reason,
            "Threat analyzer shutting down"
        );
    }

    /// Log a persisted verdict
    pub fn log_verdict(
        &self,
        document_id: &str,
        threat: &str,
        confidence: u8,
        log_preview: &str,
    ) {
        info!(
            event = "verdict_indexed",
            source = %self.source_tag,
            document_id = %document_id,
            threat = %threat,
            confidence = confidence,
            log_preview = %log_preview,
            "Indexed threat verdict"
        );
    }

    /// Log a completion that could not be reduced to a valid verdict,
    /// keeping the raw text for diagnosis
    pub fn log_parse_failure(&self, reason: &str, raw: &str) {
        warn!(
            event = "parse_failure",
            source = %self.source_tag,
            reason = %reason,
            raw_completion = %raw,
            "Model completion could not be parsed into a verdict"
        );
    }

    /// Log a candidate skipped without analysis
    pub fn log_candidate_skipped(&self, document_id: &str, reason: &str) {
        info!(
            event = "candidate_skipped",
            source = %self.source_tag,
            document_id = %document_id,
            reason = %reason,
            "Skipped candidate"
        );
    }
}

/// Truncate a log line for structured log fields
pub fn preview(log_text: &str, max_chars: usize) -> String {
    if log_text.chars().count() <= max_chars {
        log_text.to_string()
    } else {
        let truncated: String = log_text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
