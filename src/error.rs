//! Error types for query parsing and completion requests.
//!
//! Transport failures against the query service are not errors here: they
//! come back as [`crate::transport::QueryOutcome::Failure`].

use thiserror::Error;

/// Failure to turn completion text into canonical filters.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The completion text is not JSON at all.
    #[error("completion is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The JSON was rejected by the query schema.
    #[error("query violates schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    /// The JSON has the right syntax but the wrong types.
    #[error("unexpected query shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Failure to obtain text from a completion endpoint.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The endpoint could not be reached at all.
    #[error("failed to reach {backend} at {endpoint}: {source}")]
    Unreachable {
        backend: &'static str,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request took longer than the configured timeout.
    #[error("{backend} request timed out after {secs}s")]
    Timeout { backend: &'static str, secs: u64 },

    /// The endpoint answered with a non-success status.
    #[error("{backend} request failed with status {status}: {message}")]
    Status {
        backend: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },

    /// The endpoint answered, but not with the expected envelope.
    #[error("failed to parse {backend} response: {source}")]
    MalformedResponse {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The envelope parsed but carried no message content.
    #[error("empty response from {0}")]
    EmptyResponse(&'static str),

    #[error("{backend} API key not found. Set {env_var} or add api_key to the config file")]
    MissingApiKey {
        backend: &'static str,
        env_var: &'static str,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Failure of the natural language to filters step.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("failed to parse query: {0}")]
    Parse(#[from] NormalizeError),
}
