//! The driving analysis loop
//!
//! One cycle: select the newest unprocessed log, claim it, ask the model for
//! a classification, reduce the completion to a verdict, persist the merged
//! threat document. Exactly one candidate is in flight at any time; every
//! failure is logged and answered with a backoff before the next cycle, the
//! loop itself never terminates on a recoverable error.

use crate::error::AnalyzerError;
use crate::extract;
use crate::health::{components, HealthRegistry};
use crate::inference::InferenceClient;
use crate::models::{ThreatDocument, ThreatLabel};
use crate::observability::{preview, AnalyzerMetrics, StructuredLogger};
use crate::store::{ClaimOutcome, LogStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Default poll interval between cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Characters of log text kept in structured log fields
const LOG_PREVIEW_CHARS: usize = 50;

/// Configuration for the pipeline runner
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Interval between polling cycles
    pub poll_interval: Duration,
    /// Delay after a failed cycle (default 2x the poll interval)
    pub backoff: Duration,
    /// Fixed source tag stamped onto every threat document
    pub source_tag: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: DEFAULT_POLL_INTERVAL * 2,
            source_tag: "nginx".to_string(),
        }
    }
}

/// Outcome of a single polling cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// A verdict was persisted
    Indexed {
        document_id: String,
        threat: ThreatLabel,
    },
    /// No unprocessed log exists
    NoCandidate,
    /// Candidate had no usable message text; left unmarked for reselection
    SkippedNoMessage { document_id: String },
    /// Another pass claimed the record first
    SkippedAlreadyClaimed { document_id: String },
    /// The cycle failed; the loop backs off and tries again
    Failed(AnalyzerError),
}

/// Single-worker pipeline runner
pub struct PipelineRunner {
    store: Arc<dyn LogStore>,
    inference: Arc<dyn InferenceClient>,
    health: HealthRegistry,
    config: PipelineConfig,
    metrics: AnalyzerMetrics,
    logger: StructuredLogger,
}

impl PipelineRunner {
    /// Create a new runner with injected store and inference clients
    pub fn new(
        store: Arc<dyn LogStore>,
        inference: Arc<dyn InferenceClient>,
        health: HealthRegistry,
        config: PipelineConfig,
    ) -> Self {
        let logger = StructuredLogger::new(&config.source_tag);
        Self {
            store,
            inference,
            health,
            config,
            metrics: AnalyzerMetrics::new(),
            logger,
        }
    }

    /// Run the polling loop until a shutdown signal arrives
    ///
    /// Cancellation is honored at the top of the idle wait; a cycle already
    /// in flight completes before the loop exits, so no half-written state
    /// is left behind.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            backoff_secs = self.config.backoff.as_secs(),
            "Starting analysis pipeline"
        );
        self.health.report_success(components::PIPELINE).await;

        let mut delay = self.config.poll_interval;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let outcome = self.run_cycle().await;
                    self.record_outcome(&outcome).await;
                    delay = self.delay_for(&outcome);
                }
                _ = shutdown.recv() => {
                    info!("Shutting down analysis pipeline");
                    break;
                }
            }
        }
    }

    /// Delay before the next cycle, longer after a failure
    fn delay_for(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Failed(_) => self.config.backoff,
            _ => self.config.poll_interval,
        }
    }

    /// Execute one full cycle: select, claim, classify, extract, persist
    pub async fn run_cycle(&self) -> CycleOutcome {
        info!("Searching for latest unprocessed log");

        let candidate = match self.store.select_candidate().await {
            Ok(c) => c,
            Err(e) => return CycleOutcome::Failed(e),
        };

        let record = match candidate {
            Some(r) => r,
            None => {
                info!("Nothing to do, no unprocessed log found");
                return CycleOutcome::NoCandidate;
            }
        };

        let log_text = match record.message() {
            Some(m) => m.to_string(),
            None => {
                // Left unmarked on purpose: the record will be reselected
                // next cycle, a bounded-rate no-op rather than a crash.
                warn!(
                    document_id = %record.id,
                    index = %record.index,
                    "No usable log message found in candidate"
                );
                return CycleOutcome::SkippedNoMessage {
                    document_id: record.id,
                };
            }
        };

        match self.store.claim(&record).await {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::AlreadyClaimed) => {
                return CycleOutcome::SkippedAlreadyClaimed {
                    document_id: record.id,
                };
            }
            Err(e) => return CycleOutcome::Failed(e),
        }

        let started = Instant::now();
        let completion = match self.inference.classify(&log_text).await {
            Ok(c) => c,
            Err(e) => return CycleOutcome::Failed(e),
        };
        self.metrics
            .observe_inference_latency(started.elapsed().as_secs_f64());

        let verdict = match extract::extract(&completion) {
            Ok(v) => v,
            Err(e) => {
                if let AnalyzerError::Parse { reason, raw } = &e {
                    self.logger.log_parse_failure(reason, raw);
                }
                return CycleOutcome::Failed(e);
            }
        };

        // A record without a stored timestamp still gets a verdict; stamp it
        // with the analysis time instead.
        let timestamp = record
            .timestamp()
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

        let document =
            ThreatDocument::from_parts(&timestamp, &log_text, &self.config.source_tag, verdict);
        let threat = document.threat;

        match self.store.index_threat(&document).await {
            Ok(document_id) => {
                self.logger.log_verdict(
                    &document_id,
                    threat.as_str(),
                    document.confidence,
                    &preview(&log_text, LOG_PREVIEW_CHARS),
                );
                CycleOutcome::Indexed {
                    document_id,
                    threat,
                }
            }
            Err(e) => CycleOutcome::Failed(e),
        }
    }

    /// Update metrics and health from a cycle outcome
    async fn record_outcome(&self, outcome: &CycleOutcome) {
        self.metrics.inc_cycles();

        match outcome {
            CycleOutcome::Indexed { threat, .. } => {
                self.metrics.inc_verdicts_indexed(threat.as_str());
                self.health.report_success(components::STORE).await;
                self.health.report_success(components::INFERENCE).await;
            }
            CycleOutcome::NoCandidate => {
                self.health.report_success(components::STORE).await;
            }
            CycleOutcome::SkippedNoMessage { document_id } => {
                self.metrics.inc_candidates_skipped("no_message");
                self.logger.log_candidate_skipped(document_id, "no_message");
            }
            CycleOutcome::SkippedAlreadyClaimed { document_id } => {
                self.metrics.inc_candidates_skipped("already_claimed");
                self.logger
                    .log_candidate_skipped(document_id, "already_claimed");
            }
            CycleOutcome::Failed(e) => {
                self.metrics.inc_cycle_errors(e.kind());
                warn!(
                    error = %e,
                    kind = e.kind(),
                    backoff_secs = self.config.backoff.as_secs(),
                    "Cycle failed, backing off"
                );
                match e {
                    AnalyzerError::Connectivity(msg) | AnalyzerError::Write(msg) => {
                        self.health
                            .report_failure(components::STORE, msg.clone())
                            .await;
                    }
                    AnalyzerError::Invocation(msg) => {
                        self.health
                            .report_degraded(components::INFERENCE, msg.clone())
                            .await;
                    }
                    AnalyzerError::Parse { reason, .. } => {
                        self.health
                            .report_degraded(components::INFERENCE, reason.clone())
                            .await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock store with a programmable candidate and recorded writes
    struct MockStore {
        candidate: Mutex<Option<LogRecord>>,
        claim_outcome: ClaimOutcome,
        fail_select: bool,
        fail_write: bool,
        claims: AtomicUsize,
        indexed: Mutex<Vec<ThreatDocument>>,
    }

    impl MockStore {
        fn with_candidate(record: LogRecord) -> Self {
            Self {
                candidate: Mutex::new(Some(record)),
                claim_outcome: ClaimOutcome::Claimed,
                fail_select: false,
                fail_write: false,
                claims: AtomicUsize::new(0),
                indexed: Mutex::new(Vec::new()),
            }
        }

        fn empty() -> Self {
            Self {
                candidate: Mutex::new(None),
                claim_outcome: ClaimOutcome::Claimed,
                fail_select: false,
                fail_write: false,
                claims: AtomicUsize::new(0),
                indexed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LogStore for MockStore {
        async fn select_candidate(&self) -> Result<Option<LogRecord>, AnalyzerError> {
            if self.fail_select {
                return Err(AnalyzerError::Connectivity("connection refused".into()));
            }
            Ok(self.candidate.lock().unwrap().clone())
        }

        async fn claim(&self, _record: &LogRecord) -> Result<ClaimOutcome, AnalyzerError> {
            self.claims.fetch_add(1, Ordering::SeqCst);
            Ok(self.claim_outcome)
        }

        async fn index_threat(&self, document: &ThreatDocument) -> Result<String, AnalyzerError> {
            if self.fail_write {
                return Err(AnalyzerError::Write("mapping conflict".into()));
            }
            self.indexed.lock().unwrap().push(document.clone());
            Ok(format!("threat-{}", self.indexed.lock().unwrap().len()))
        }
    }

    /// Mock inference returning a fixed completion
    struct MockInference {
        completion: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl MockInference {
        fn returning(completion: &str) -> Self {
            Self {
                completion: Ok(completion.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                completion: Err(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceClient for MockInference {
        async fn classify(&self, _log_text: &str) -> Result<String, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.completion {
                Ok(c) => Ok(c.clone()),
                Err(()) => Err(AnalyzerError::Invocation("request timed out".into())),
            }
        }
    }

    fn nginx_record() -> LogRecord {
        LogRecord {
            index: "logs-2026.08.30".to_string(),
            id: "doc-1".to_string(),
            source: json!({
                "@timestamp": "2026-08-30T10:00:00Z",
                "message": "GET /admin HTTP/1.1 401"
            }),
        }
    }

    fn runner(store: Arc<MockStore>, inference: Arc<MockInference>) -> PipelineRunner {
        PipelineRunner::new(
            store,
            inference,
            HealthRegistry::new(),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_successful_cycle_persists_merged_document() {
        let store = Arc::new(MockStore::with_candidate(nginx_record()));
        let inference = Arc::new(MockInference::returning(
            r#"{"threat":"brute_force","confidence":70,"evidence":{"path":"/admin"},"recommendation":"rate-limit"}"#,
        ));
        let runner = runner(store.clone(), inference.clone());

        let outcome = runner.run_cycle().await;
        match outcome {
            CycleOutcome::Indexed { threat, .. } => assert_eq!(threat, ThreatLabel::BruteForce),
            other => panic!("expected Indexed, got {other:?}"),
        }

        assert_eq!(store.claims.load(Ordering::SeqCst), 1);
        let indexed = store.indexed.lock().unwrap();
        assert_eq!(indexed.len(), 1);
        let doc = &indexed[0];
        assert_eq!(doc.timestamp, "2026-08-30T10:00:00Z");
        assert_eq!(doc.log, "GET /admin HTTP/1.1 401");
        assert_eq!(doc.source, "nginx");
        assert_eq!(doc.threat, ThreatLabel::BruteForce);
        assert_eq!(doc.confidence, 70);
        assert_eq!(doc.evidence, json!({"path": "/admin"}));
        assert_eq!(doc.recommendation, "rate-limit");
    }

    #[tokio::test]
    async fn test_no_candidate_is_a_quiet_cycle() {
        let store = Arc::new(MockStore::empty());
        let inference = Arc::new(MockInference::returning("{}"));
        let runner = runner(store.clone(), inference.clone());

        let outcome = runner.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::NoCandidate));
        assert_eq!(inference.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.claims.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_candidate_without_message_is_skipped_unmarked() {
        let record = LogRecord {
            index: "logs-2026.08.30".to_string(),
            id: "doc-2".to_string(),
            source: json!({"@timestamp": "2026-08-30T10:00:00Z"}),
        };
        let store = Arc::new(MockStore::with_candidate(record));
        let inference = Arc::new(MockInference::returning("{}"));
        let runner = runner(store.clone(), inference.clone());

        let outcome = runner.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::SkippedNoMessage { .. }));
        // Not marked: the record must stay reselectable
        assert_eq!(store.claims.load(Ordering::SeqCst), 0);
        assert_eq!(inference.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_contended_claim_skips_without_inference() {
        let mut store = MockStore::with_candidate(nginx_record());
        store.claim_outcome = ClaimOutcome::AlreadyClaimed;
        let store = Arc::new(store);
        let inference = Arc::new(MockInference::returning("{}"));
        let runner = runner(store.clone(), inference.clone());

        let outcome = runner.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::SkippedAlreadyClaimed { .. }));
        assert_eq!(inference.calls.load(Ordering::SeqCst), 0);
        assert!(store.indexed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inference_timeout_writes_nothing() {
        let store = Arc::new(MockStore::with_candidate(nginx_record()));
        let inference = Arc::new(MockInference::failing());
        let runner = runner(store.clone(), inference.clone());

        let outcome = runner.run_cycle().await;
        match outcome {
            CycleOutcome::Failed(e) => assert_eq!(e.kind(), "invocation"),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(store.indexed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_prose_writes_nothing() {
        let store = Arc::new(MockStore::with_candidate(nginx_record()));
        let inference = Arc::new(MockInference::returning(
            "Sorry, I could not find any JSON-worthy threats here.",
        ));
        let runner = runner(store.clone(), inference.clone());

        let outcome = runner.run_cycle().await;
        match outcome {
            CycleOutcome::Failed(e) => assert_eq!(e.kind(), "parse"),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(store.indexed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_rejection_surfaces_as_write_error() {
        let mut store = MockStore::with_candidate(nginx_record());
        store.fail_write = true;
        let store = Arc::new(store);
        let inference = Arc::new(MockInference::returning(
            r#"{"threat":"none","confidence":5,"evidence":{},"recommendation":"no action"}"#,
        ));
        let runner = runner(store.clone(), inference);

        let outcome = runner.run_cycle().await;
        match outcome {
            CycleOutcome::Failed(e) => assert_eq!(e.kind(), "write"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_select_failure_surfaces_as_connectivity() {
        let mut store = MockStore::empty();
        store.fail_select = true;
        let store = Arc::new(store);
        let inference = Arc::new(MockInference::returning("{}"));
        let runner = runner(store, inference);

        let outcome = runner.run_cycle().await;
        match outcome {
            CycleOutcome::Failed(e) => assert_eq!(e.kind(), "connectivity"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_cycle_backs_off_longer() {
        let store = Arc::new(MockStore::empty());
        let inference = Arc::new(MockInference::returning("{}"));
        let runner = runner(store, inference);

        let ok = CycleOutcome::NoCandidate;
        let failed = CycleOutcome::Failed(AnalyzerError::Connectivity("refused".into()));
        assert_eq!(runner.delay_for(&ok), runner.config.poll_interval);
        assert_eq!(runner.delay_for(&failed), runner.config.backoff);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let store = Arc::new(MockStore::empty());
        let inference = Arc::new(MockInference::returning("{}"));
        let runner = runner(store, inference);

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(runner.run(shutdown_rx));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pipeline did not stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failure_marks_store_unhealthy() {
        let mut store = MockStore::empty();
        store.fail_select = true;
        let store = Arc::new(store);
        let inference = Arc::new(MockInference::returning("{}"));
        let health = HealthRegistry::new();
        health.register(components::STORE).await;
        let runner = PipelineRunner::new(store, inference, health.clone(), PipelineConfig::default());

        let outcome = runner.run_cycle().await;
        runner.record_outcome(&outcome).await;

        let report = health.health().await;
        assert_eq!(
            report.components[components::STORE].status,
            crate::health::ComponentStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_repeated_parse_failures_escalate_inference() {
        let store = Arc::new(MockStore::with_candidate(nginx_record()));
        let inference = Arc::new(MockInference::returning("no json here at all"));
        let health = HealthRegistry::new();
        health.register(components::INFERENCE).await;
        let runner =
            PipelineRunner::new(store, inference, health.clone(), PipelineConfig::default());

        for _ in 0..3 {
            let outcome = runner.run_cycle().await;
            runner.record_outcome(&outcome).await;
        }

        let report = health.health().await;
        assert_eq!(
            report.components[components::INFERENCE].status,
            crate::health::ComponentStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_successful_cycle_recovers_degraded_inference() {
        let store = Arc::new(MockStore::with_candidate(nginx_record()));
        let inference = Arc::new(MockInference::returning(
            r#"{"threat":"none","confidence":5,"evidence":{},"recommendation":"no action"}"#,
        ));
        let health = HealthRegistry::new();
        health.register(components::INFERENCE).await;
        health
            .report_degraded(components::INFERENCE, "request timed out")
            .await;
        let runner =
            PipelineRunner::new(store, inference, health.clone(), PipelineConfig::default());

        let outcome = runner.run_cycle().await;
        runner.record_outcome(&outcome).await;

        let report = health.health().await;
        assert_eq!(
            report.components[components::INFERENCE].status,
            crate::health::ComponentStatus::Healthy
        );
        assert_eq!(
            report.components[components::INFERENCE].consecutive_failures,
            0
        );
    }
}
