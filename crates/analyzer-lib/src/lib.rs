//! Core library for the log threat analyzer
//!
//! This crate provides the analysis pipeline bridging unstructured log
//! documents and structured threat intelligence:
//! - Candidate selection and atomic claim against the index store
//! - Prompt-driven inference invocation against a local LLM service
//! - Tolerant extraction of a validated verdict from free-text completions
//! - Idempotent persistence of merged threat documents
//! - Health checks and observability

pub mod error;
pub mod extract;
pub mod health;
pub mod inference;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod store;

pub use error::AnalyzerError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AnalyzerMetrics, StructuredLogger};
pub use pipeline::{CycleOutcome, PipelineConfig, PipelineRunner};
