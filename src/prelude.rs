//! Convenience re-exports for common use.

pub use crate::agent::{Agent, Chat, SubAgentTool};
pub use crate::agent_loop::{
    DispatchMode, FinishReason, RunEvent, RunEventPayload, RunRequest, RunResult,
};
pub use crate::config::{ConvoyConfig, RunConfig};
pub use crate::error::{ConvoyError, Result, ToolError};
pub use crate::provider::ModelProvider;
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolExecutionContext};
pub use crate::types::{AssistantTurn, ContentPart, Message, Role, TokenUsage, ToolCall};
