//! Tool system for function calling.

pub mod arguments;
pub mod finish;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use finish::{finish_tool_definition, FinishPayload, FINISH_TOOL_NAME};
pub use registry::ToolRegistry;
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{AgentToolParameters, ToolDefinition};
