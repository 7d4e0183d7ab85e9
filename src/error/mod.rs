//! Error types for convoy.
//!
//! Two layers exist. [`ConvoyError`] ends a run (or a transport call) and is
//! returned to the caller. [`ToolError`] is local to one tool call: the loop turns
//! it into an error tool result the model can react to, so the run continues.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all convoy operations.
#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    /// Argument fragments arrived for tool-call indices that never started.
    #[error("Malformed stream: argument fragments for unstarted tool calls at indices {orphaned_indices:?}")]
    MalformedStream { orphaned_indices: Vec<usize> },

    #[error("Invalid finish payload: {0}")]
    InvalidFinishPayload(String),

    #[error("Run exceeded max iterations ({max_iterations})")]
    IterationLimit { max_iterations: usize },

    #[error("Nested run depth limit reached (depth {current}, max {max})")]
    DepthExceeded { current: usize, max: usize },

    #[error("Token budget exceeded ({used} used, budget {budget})")]
    BudgetExceeded { used: u64, budget: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The spawned task driving a streaming run panicked.
    #[error("Run task failed: {0}")]
    TaskFailed(String),
}

impl ConvoyError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Stream(_) => ErrorCategory::Network,
            Self::Configuration(_) | Self::InvalidArgument(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::MalformedStream { .. } | Self::InvalidFinishPayload(_) => ErrorCategory::Protocol,
            Self::IterationLimit { .. } => ErrorCategory::RunLimit,
            Self::DepthExceeded { .. } | Self::BudgetExceeded { .. } => ErrorCategory::Nested,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::TaskFailed(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether the transport call that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server
        )
    }

    /// Whether a parent run can absorb this error as tool feedback.
    pub fn is_recoverable_by_parent(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::RunLimit => RecoverySuggestion::RaiseIterationLimit,
            ErrorCategory::Nested => RecoverySuggestion::ReduceNesting,
            ErrorCategory::Protocol | ErrorCategory::Serialization => {
                RecoverySuggestion::InspectModelOutput
            }
            ErrorCategory::Api | ErrorCategory::Cancellation | ErrorCategory::Unknown => {
                RecoverySuggestion::None
            }
        }
    }
}

/// Failure of a single tool call.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found (available: {available})")]
    NotFound { available: String },

    #[error("invalid arguments: {0}")]
    ArgumentDecode(String),

    #[error("{0}")]
    Execution(String),

    #[error("output could not be encoded: {0}")]
    OutputEncode(String),

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("nested run failed: {0}")]
    Nested(Box<ConvoyError>),

    /// Never turned into feedback; aborts the run.
    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Text fed back to the model as the error tool result.
    pub fn feedback_message(&self, tool_name: &str) -> String {
        match self {
            Self::NotFound { available } if available.is_empty() => {
                format!("Tool '{tool_name}' not found. No tools are available.")
            }
            Self::NotFound { available } => {
                format!("Tool '{tool_name}' not found. Available tools: {available}")
            }
            Self::ArgumentDecode(msg) => {
                format!("Invalid arguments for tool '{tool_name}': {msg}")
            }
            Self::Execution(msg) => format!("Tool '{tool_name}' failed: {msg}"),
            Self::OutputEncode(msg) => {
                format!("Tool '{tool_name}' produced output that could not be encoded: {msg}")
            }
            Self::Timeout { timeout_ms } => {
                format!("Tool '{tool_name}' timed out after {timeout_ms}ms")
            }
            Self::Nested(err) => format!("Sub-agent '{tool_name}' failed: {err}"),
            Self::Cancelled => format!("Tool '{tool_name}' was cancelled"),
        }
    }
}

impl From<ConvoyError> for ToolError {
    fn from(err: ConvoyError) -> Self {
        match err {
            ConvoyError::Cancelled => Self::Cancelled,
            other => Self::Nested(Box::new(other)),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConvoyError>;
