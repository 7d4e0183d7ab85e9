//! The synthetic tool an agent calls to end its run.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::types::ToolDefinition;
use crate::error::ConvoyError;

/// Default terminal tool name.
pub const FINISH_TOOL_NAME: &str = "finish";

pub const FINISH_TOOL_DESCRIPTION: &str = "Call this when the task is complete. \
`content` is the final answer for the user. `reason` optionally says why you stopped.";

/// Catalogue entry for a terminal tool called `name`.
pub fn finish_tool_definition(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: FINISH_TOOL_DESCRIPTION.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "Final answer"},
                "reason": {"type": "string", "description": "Why the task ended"},
            },
            "required": ["content"],
        }),
    }
}

/// Arguments of a terminal tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishPayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FinishPayload {
    pub fn parse(raw: &str) -> Result<Self, ConvoyError> {
        serde_json::from_str(raw).map_err(|e| ConvoyError::InvalidFinishPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_is_optional() {
        let payload = FinishPayload::parse(r#"{"content": "done"}"#).unwrap();
        assert_eq!(payload.content, "done");
        assert_eq!(payload.reason, None);
    }

    #[test]
    fn missing_content_is_rejected() {
        let err = FinishPayload::parse(r#"{"reason": "bored"}"#).unwrap_err();
        assert!(matches!(err, ConvoyError::InvalidFinishPayload(_)));
    }
}
