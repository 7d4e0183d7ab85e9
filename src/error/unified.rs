//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Serialization,
    /// The model or transport broke a structural rule of the conversation protocol.
    Protocol,
    /// Iteration ceiling reached.
    RunLimit,
    /// Depth or token budget of a nested run exhausted.
    Nested,
    Cancellation,
    Configuration,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    RaiseIterationLimit,
    ReduceNesting,
    InspectModelOutput,
    None,
}
