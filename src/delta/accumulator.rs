//! Reconstruction of one assistant turn from streamed fragments.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};

use super::reasoning::consolidate_reasoning_details;
use crate::error::{ConvoyError, Result};
use crate::types::{AssistantTurn, StreamDelta, TokenUsage, ToolCall};

/// Incremental output worth showing to a user while the turn is still streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveDelta {
    Text(String),
    Reasoning(String),
}

#[derive(Debug)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds [`StreamDelta`]s, in arrival order, into an [`AssistantTurn`].
///
/// Create one per turn. Argument fragments for an index that has not started yet
/// are buffered and claimed when the start arrives; anything still buffered at
/// the end is a protocol error.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    content: String,
    reasoning: String,
    reasoning_details: Vec<serde_json::Value>,
    open_calls: BTreeMap<usize, PartialToolCall>,
    pending_arguments: BTreeMap<usize, String>,
    usage: Option<TokenUsage>,
    saw_finished: bool,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fragment, returning any text worth emitting live.
    pub fn push(&mut self, delta: StreamDelta) -> Option<LiveDelta> {
        match delta {
            StreamDelta::Content { text } => {
                if text.is_empty() {
                    return None;
                }
                self.content.push_str(&text);
                Some(LiveDelta::Text(text))
            }
            StreamDelta::Reasoning { text } => {
                if text.is_empty() {
                    return None;
                }
                self.reasoning.push_str(&text);
                Some(LiveDelta::Reasoning(text))
            }
            StreamDelta::ReasoningDetails { details } => {
                self.reasoning_details.extend(details);
                None
            }
            StreamDelta::ToolCallStart { index, id, name } => {
                match self.open_calls.get_mut(&index) {
                    // Some providers repeat the start; keep the arguments gathered so far.
                    Some(open) => {
                        if !id.is_empty() {
                            open.id = id;
                        }
                        if !name.is_empty() {
                            open.name = name;
                        }
                    }
                    None => {
                        let arguments = self.pending_arguments.remove(&index).unwrap_or_default();
                        self.open_calls.insert(
                            index,
                            PartialToolCall {
                                id,
                                name,
                                arguments,
                            },
                        );
                    }
                }
                None
            }
            StreamDelta::ToolCallDelta { index, fragment } => {
                match self.open_calls.get_mut(&index) {
                    Some(open) => open.arguments.push_str(&fragment),
                    None => self
                        .pending_arguments
                        .entry(index)
                        .or_default()
                        .push_str(&fragment),
                }
                None
            }
            StreamDelta::Finished { usage } => {
                self.saw_finished = true;
                if let Some(usage) = usage {
                    self.usage.get_or_insert_with(TokenUsage::default).merge(&usage);
                }
                None
            }
        }
    }

    /// Close the turn.
    pub fn finish(self) -> Result<AssistantTurn> {
        if !self.pending_arguments.is_empty() {
            return Err(ConvoyError::MalformedStream {
                orphaned_indices: self.pending_arguments.into_keys().collect(),
            });
        }
        if !self.saw_finished {
            tracing::warn!("stream ended without a finished fragment");
        }

        let tool_calls = self
            .open_calls
            .into_values()
            .map(|call| ToolCall {
                id: call.id,
                name: call.name,
                arguments: call.arguments,
            })
            .collect();

        let reasoning_details = consolidate_reasoning_details(self.reasoning_details);

        Ok(AssistantTurn {
            content: self.content,
            tool_calls,
            usage: self.usage,
            reasoning_content: (!self.reasoning.is_empty()).then_some(self.reasoning),
            reasoning_details: (!reasoning_details.is_empty()).then_some(reasoning_details),
        })
    }
}

/// Drain `stream` into one turn, reporting live text through `on_live`.
///
/// A transport error item ends the fold with that error.
pub async fn accumulate_stream<S, F>(stream: S, mut on_live: F) -> Result<AssistantTurn>
where
    S: Stream<Item = Result<StreamDelta>>,
    F: FnMut(LiveDelta),
{
    let mut stream = std::pin::pin!(stream);
    let mut accumulator = DeltaAccumulator::new();
    while let Some(item) = stream.next().await {
        if let Some(live) = accumulator.push(item?) {
            on_live(live);
        }
    }
    accumulator.finish()
}
