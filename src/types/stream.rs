//! Streaming fragment types.

use serde::{Deserialize, Serialize};

use super::usage::TokenUsage;

/// One low-level fragment of a streamed assistant turn.
///
/// Tool-call fragments are keyed by a provider-assigned index. Fragments for an
/// index may arrive before the `ToolCallStart` that opens it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    Content {
        text: String,
    },
    Reasoning {
        text: String,
    },
    ReasoningDetails {
        details: Vec<serde_json::Value>,
    },
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
    },
    ToolCallDelta {
        index: usize,
        fragment: String,
    },
    Finished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
}

impl StreamDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning { text: text.into() }
    }

    pub fn tool_call_start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolCallStart {
            index,
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn tool_call_delta(index: usize, fragment: impl Into<String>) -> Self {
        Self::ToolCallDelta {
            index,
            fragment: fragment.into(),
        }
    }

    pub fn finished(usage: Option<TokenUsage>) -> Self {
        Self::Finished { usage }
    }
}
