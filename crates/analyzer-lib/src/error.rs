//! Error taxonomy for the analysis pipeline
//!
//! Every component returns a specific error kind; only the pipeline runner
//! decides what to do with them (log and back off). All variants are
//! recoverable at the cycle level.

use thiserror::Error;

/// Errors surfaced by pipeline components
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The index store or inference service could not be reached
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// The inference service rejected or failed the generate call
    #[error("inference invocation failed: {0}")]
    Invocation(String),

    /// The model completion could not be reduced to a valid verdict
    #[error("unparsable completion: {reason}")]
    Parse {
        reason: String,
        /// Original completion text, kept for diagnostics
        raw: String,
    },

    /// The threat index rejected the document write
    #[error("threat index write failed: {0}")]
    Write(String),
}

impl AnalyzerError {
    /// Short kind tag used for logging and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzerError::Connectivity(_) => "connectivity",
            AnalyzerError::Invocation(_) => "invocation",
            AnalyzerError::Parse { .. } => "parse",
            AnalyzerError::Write(_) => "write",
        }
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AnalyzerError::Connectivity(err.to_string())
        } else {
            AnalyzerError::Invocation(err.to_string())
        }
    }
}
