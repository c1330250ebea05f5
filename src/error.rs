//! Typed errors for the scenario engine and its collaborators.
//!
//! Only [`ConfigError`] is fatal for a run. Transport and extraction
//! errors are step-local: they are logged, recorded on the step, and
//! the run moves on to the next step.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed suite or scenario definitions. Aborts the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scenario #{index} has an empty name")]
    EmptyScenarioName { index: usize },

    #[error("step #{index} of scenario '{scenario}' has an empty name")]
    EmptyStepName { scenario: String, index: usize },

    #[error("step '{step}' appears more than once in scenario '{scenario}'")]
    DuplicateStep { scenario: String, step: String },

    #[error("step '{step}' of scenario '{scenario}' has no endpoint")]
    MissingEndpoint { scenario: String, step: String },

    #[error("scenario '{0}' not found")]
    UnknownScenario(String),

    #[error("include cycle detected at {}", .0.display())]
    IncludeCycle(PathBuf),

    #[error("base URL is not configured")]
    MissingBaseUrl,

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Failure to complete an HTTP exchange at all (no status code).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// Response body could not be used for extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
