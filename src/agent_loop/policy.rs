//! When a run ends and which tool calls it executes.

use crate::tools::FINISH_TOOL_NAME;
use crate::types::{AssistantTurn, ToolCall};

/// Termination policy of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Autonomous: only a call to `terminal_tool` ends the run. A turn without tool
    /// calls just continues the loop.
    Agent { terminal_tool: String },
    /// User-driven: the first turn without tool calls ends the run.
    Chat,
}

impl TerminationPolicy {
    pub fn agent() -> Self {
        Self::Agent {
            terminal_tool: FINISH_TOOL_NAME.to_string(),
        }
    }

    pub fn chat() -> Self {
        Self::Chat
    }

    pub fn terminal_tool(&self) -> Option<&str> {
        match self {
            Self::Agent { terminal_tool } => Some(terminal_tool),
            Self::Chat => None,
        }
    }

    /// The first call to the terminal tool, if any.
    pub fn terminal_call<'a>(&self, turn: &'a AssistantTurn) -> Option<&'a ToolCall> {
        let terminal = self.terminal_tool()?;
        turn.tool_calls.iter().find(|call| call.name == terminal)
    }

    pub fn should_terminate(&self, turn: &AssistantTurn) -> bool {
        match self {
            Self::Agent { .. } => self.terminal_call(turn).is_some(),
            Self::Chat => turn.tool_calls.is_empty(),
        }
    }

    /// Calls to announce and execute, in the order the model issued them.
    pub fn executable_calls<'a>(&self, turn: &'a AssistantTurn) -> Vec<&'a ToolCall> {
        match self.terminal_tool() {
            Some(terminal) => turn
                .tool_calls
                .iter()
                .filter(|call| call.name != terminal)
                .collect(),
            None => turn.tool_calls.iter().collect(),
        }
    }
}
