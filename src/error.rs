//! Error taxonomy for a hot-trends run.
//!
//! Variants fall into four groups:
//! - transient network/API failures ([`AnalyzerError::Http`],
//!   [`AnalyzerError::Status`], [`AnalyzerError::Timeout`],
//!   [`AnalyzerError::InvalidBody`]), which the retrying client absorbs until
//!   it gives up with [`AnalyzerError::RetriesExhausted`]
//! - data-shape failures ([`AnalyzerError::DataShape`])
//! - fatal preconditions ([`AnalyzerError::ModelUnavailable`],
//!   [`AnalyzerError::NoTopics`], [`AnalyzerError::EmptySummary`])
//! - relay failures ([`AnalyzerError::Relay`])

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Connection, TLS or protocol failure from `reqwest`.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The request did not finish within its per-call timeout.
    #[error("{url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// A 2xx response whose body is not JSON.
    #[error("{url} returned a non-JSON body: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON parsed but did not have the expected shape.
    #[error("unexpected data shape for {context}: {reason}")]
    DataShape { context: String, reason: String },

    /// Every attempt of a retried call failed.
    #[error("{label} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        last_error: String,
    },

    /// The inference model is neither installed nor pullable.
    #[error("model {model} is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Topic collection yielded nothing for any platform.
    #[error("no hot-search topics were collected from any platform")]
    NoTopics,

    /// The inference call succeeded but produced no text.
    #[error("the model returned an empty summary")]
    EmptySummary,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The supervised analysis process failed or its result was unusable.
    #[error("{0}")]
    Relay(String),
}

impl AnalyzerError {
    pub fn data_shape(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataShape {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retried call should try again after this error.
    ///
    /// Transport, status, timeout and body-decoding failures are transient.
    /// Everything else is returned to the caller immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status { .. } | Self::Timeout { .. } | Self::InvalidBody { .. }
        )
    }
}
