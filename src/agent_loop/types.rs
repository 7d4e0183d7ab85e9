//! Core run types for the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::types::{Message, TokenUsage};

/// Unique run identifier.
pub type RunId = Uuid;

/// Why a run completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    /// The agent called its terminal tool.
    FinishTool,
    /// A chat turn came back without tool calls.
    NoToolCalls,
}

/// How the tool calls of one turn are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchMode {
    /// All calls in flight at once; results still appended in call order.
    #[default]
    Concurrent,
    /// One call at a time, in call order.
    Sequential,
}

/// Whether turns are requested whole or as fragment streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RequestMode {
    Batched,
    Streaming,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub run_id: RunId,
    pub finish_reason: FinishReason,
    /// The `reason` an agent gave when finishing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_note: Option<String>,
    pub content: String,
    pub total_usage: TokenUsage,
    pub iteration_count: usize,
    /// The full, untruncated log including the new user message.
    pub history: Vec<Message>,
    pub finished_at: DateTime<Utc>,
}
