//! Component health tracking for the analyzer
//!
//! The pipeline reports every cycle outcome here; the registry turns those
//! reports into per-component status backing the liveness and readiness
//! endpoints. One failed inference or one garbled completion only degrades
//! the inference component, but repeated failures without a successful cycle
//! in between escalate it to unhealthy.
//!
//! Readiness is gated on startup bootstrap and on the index store: a dead
//! store means the analyzer can neither select nor persist. An unhealthy
//! inference service does not flip readiness, since restarting the analyzer
//! cannot revive a remote model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive degraded reports after which a component counts as down
const ESCALATION_THRESHOLD: u32 = 3;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing, but recently enough healthy that the next cycle may recover
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Tracked state of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed reports since the last successful one
    pub consecutive_failures: u32,
    pub last_transition_timestamp: i64,
}

impl ComponentHealth {
    fn starting() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_transition_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Aggregated health report served by `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Readiness report served by `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names the pipeline reports on
pub mod components {
    pub const STORE: &str = "store";
    pub const INFERENCE: &str = "inference";
    pub const PIPELINE: &str = "pipeline";
}

/// Shared registry of component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component before the first cycle runs
    pub async fn register(&self, name: &str) {
        let mut map = self.components.write().await;
        map.insert(name.to_string(), ComponentHealth::starting());
    }

    /// Record a successful interaction, clearing any accumulated failures
    pub async fn report_success(&self, name: &str) {
        let mut map = self.components.write().await;
        let entry = map
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::starting);
        entry.status = ComponentStatus::Healthy;
        entry.message = None;
        entry.consecutive_failures = 0;
        entry.last_transition_timestamp = chrono::Utc::now().timestamp();
    }

    /// Record a recoverable failure
    ///
    /// The component degrades on the first report and escalates to unhealthy
    /// once [`ESCALATION_THRESHOLD`] reports accumulate without a success.
    pub async fn report_degraded(&self, name: &str, message: impl Into<String>) {
        let mut map = self.components.write().await;
        let entry = map
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::starting);
        entry.consecutive_failures += 1;
        entry.status = if entry.consecutive_failures >= ESCALATION_THRESHOLD {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        entry.message = Some(message.into());
        entry.last_transition_timestamp = chrono::Utc::now().timestamp();
    }

    /// Record a hard failure, marking the component down immediately
    pub async fn report_failure(&self, name: &str, message: impl Into<String>) {
        let mut map = self.components.write().await;
        let entry = map
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::starting);
        entry.consecutive_failures += 1;
        entry.status = ComponentStatus::Unhealthy;
        entry.message = Some(message.into());
        entry.last_transition_timestamp = chrono::Utc::now().timestamp();
    }

    /// Flip readiness once startup bootstrap finishes
    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    /// Aggregate component states into a health report
    ///
    /// Any unhealthy component makes the whole analyzer unhealthy; any
    /// degraded one makes it degraded.
    pub async fn health(&self) -> HealthResponse {
        let map = self.components.read().await.clone();

        let mut status = ComponentStatus::Healthy;
        for health in map.values() {
            match health.status {
                ComponentStatus::Unhealthy => {
                    status = ComponentStatus::Unhealthy;
                    break;
                }
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }

        HealthResponse {
            status,
            components: map,
        }
    }

    /// Readiness: bootstrap finished and the store still answering
    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Startup bootstrap not finished".to_string()),
            };
        }

        let map = self.components.read().await;
        let store_down = map
            .get(components::STORE)
            .is_some_and(|c| !c.status.is_operational());

        if store_down {
            ReadinessResponse {
                ready: false,
                reason: Some("Index store unreachable".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_components_start_healthy() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(
            health.components[components::STORE].status,
            ComponentStatus::Healthy
        );
        assert_eq!(health.components[components::STORE].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_single_degraded_report_does_not_escalate() {
        let registry = HealthRegistry::new();
        registry.register(components::INFERENCE).await;

        registry
            .report_degraded(components::INFERENCE, "unparsable completion")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::INFERENCE].consecutive_failures,
            1
        );
    }

    #[tokio::test]
    async fn test_repeated_degraded_reports_escalate_to_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register(components::INFERENCE).await;

        for _ in 0..3 {
            registry
                .report_degraded(components::INFERENCE, "request timed out")
                .await;
        }

        let health = registry.health().await;
        assert_eq!(
            health.components[components::INFERENCE].status,
            ComponentStatus::Unhealthy
        );
        assert_eq!(health.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let registry = HealthRegistry::new();
        registry.register(components::INFERENCE).await;

        registry
            .report_degraded(components::INFERENCE, "request timed out")
            .await;
        registry
            .report_degraded(components::INFERENCE, "request timed out")
            .await;
        registry.report_success(components::INFERENCE).await;
        registry
            .report_degraded(components::INFERENCE, "request timed out")
            .await;

        // The streak restarted after the success, so still only degraded
        let health = registry.health().await;
        assert_eq!(
            health.components[components::INFERENCE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            health.components[components::INFERENCE].consecutive_failures,
            1
        );
    }

    #[tokio::test]
    async fn test_hard_failure_is_immediately_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;

        registry
            .report_failure(components::STORE, "connection refused")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_not_ready_until_bootstrap_completes() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_ready_after_bootstrap() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
    }

    #[tokio::test]
    async fn test_store_failure_flips_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;
        registry.set_ready(true).await;
        registry
            .report_failure(components::STORE, "connection refused")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
    }

    #[tokio::test]
    async fn test_inference_outage_does_not_flip_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;
        registry.register(components::INFERENCE).await;
        registry.set_ready(true).await;

        for _ in 0..5 {
            registry
                .report_degraded(components::INFERENCE, "model not loaded")
                .await;
        }

        // Unhealthy overall, but restarting the analyzer cannot fix a remote
        // model, so readiness holds as long as the store answers
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        assert!(registry.readiness().await.ready);
    }
}
