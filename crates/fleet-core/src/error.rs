use std::time::Duration;
use thiserror::Error;

/// A convenience `Result` alias using [`FleetError`].
pub type FleetResult<T> = Result<T, FleetError>;

/// Top-level error type for the fleet supervisor.
///
/// The variants follow the pipeline's error taxonomy: transient reasoning
/// failures are retried and then recovered through heuristics, validation
/// problems are repaired locally, and only agent execution and configuration
/// errors ever reach the consumer of a run.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Network, rate-limit or upstream-overload failure of a reasoning call.
    #[error("Transient reasoning error: {0}")]
    TransientReasoning(String),

    /// A reasoning call failed in a way that retrying cannot fix
    /// (malformed request, unparseable structured output, ...).
    #[error("Reasoning error: {0}")]
    Reasoning(String),

    /// Malformed stage input or output.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An assigned agent failed irrecoverably.
    #[error("Agent '{agent}' failed: {message}")]
    AgentExecution {
        /// Identifier of the failing agent.
        agent: String,
        /// Failure description reported by the agent runtime.
        message: String,
    },

    /// An operation exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Missing or invalid configuration, detected before any stage runs.
    #[error("Config error: {0}")]
    Config(String),

    /// Transport-level failure of an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run was abandoned by its consumer.
    #[error("Cancelled")]
    Cancelled,

    /// A retried operation kept failing until the attempt budget ran out.
    #[error("{source} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        /// Number of attempts made, including the first one.
        attempts: u32,
        /// The error returned by the last attempt.
        #[source]
        source: Box<FleetError>,
    },
}

impl FleetError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FleetError::TransientReasoning(_) | FleetError::Timeout(_) | FleetError::Http(_)
        )
    }

    /// Number of attempts recorded on the error (1 for errors that were never retried).
    pub fn attempts(&self) -> u32 {
        match self {
            FleetError::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// The underlying error, looking through retry exhaustion wrappers.
    pub fn root(&self) -> &FleetError {
        match self {
            FleetError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}
