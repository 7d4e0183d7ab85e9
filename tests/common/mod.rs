//! Shared test helpers and a scripted provider.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use convoy::error::{ConvoyError, Result};
use convoy::provider::{ModelProvider, ProviderRequest};
use convoy::types::*;

/// One queued provider reply.
pub enum Script {
    Turn(AssistantTurn),
    /// Raw fragments, only valid for streaming requests.
    Deltas(Vec<StreamDelta>),
    /// Never answers.
    Hang,
    /// Panics inside the provider call.
    Panic,
}

/// A provider that replays queued replies and records every request.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_turns(turns: impl IntoIterator<Item = AssistantTurn>) -> Self {
        let provider = Self::new();
        for turn in turns {
            provider.push(Script::Turn(turn));
        }
        provider
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self, request: &ProviderRequest) -> Result<Script> {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ConvoyError::Stream("script exhausted".into()))
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<AssistantTurn> {
        match self.next_script(request)? {
            Script::Turn(turn) => Ok(turn),
            Script::Deltas(_) => Err(ConvoyError::Stream("delta script on batched request".into())),
            Script::Hang => std::future::pending().await,
            Script::Panic => panic!("scripted provider panic"),
        }
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        let deltas = match self.next_script(request)? {
            Script::Turn(turn) => turn_to_deltas(turn),
            Script::Deltas(deltas) => deltas,
            Script::Hang => return std::future::pending().await,
            Script::Panic => panic!("scripted provider panic"),
        };
        Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
    }
}

fn turn_to_deltas(turn: AssistantTurn) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    if let Some(reasoning) = turn.reasoning_content {
        deltas.push(StreamDelta::reasoning(reasoning));
    }
    if !turn.content.is_empty() {
        deltas.push(StreamDelta::content(turn.content));
    }
    for (index, call) in turn.tool_calls.into_iter().enumerate() {
        deltas.push(StreamDelta::tool_call_start(index, call.id, call.name));
        deltas.push(StreamDelta::tool_call_delta(index, call.arguments));
    }
    deltas.push(StreamDelta::finished(turn.usage));
    deltas
}

/// A turn calling the given tools, each `(id, name, arguments)`.
pub fn calls(calls: &[(&str, &str, &str)]) -> AssistantTurn {
    calls
        .iter()
        .fold(AssistantTurn::default(), |turn, (id, name, args)| {
            turn.with_tool_call(ToolCall::new(*id, *name, *args))
        })
}

/// A turn calling `finish` with `content`.
pub fn finish(id: &str, content: &str) -> AssistantTurn {
    let args = serde_json::json!({ "content": content }).to_string();
    AssistantTurn::default().with_tool_call(ToolCall::new(id, "finish", args))
}

/// Tool messages of a log, in order.
pub fn tool_messages(history: &[Message]) -> Vec<ToolMessage> {
    history
        .iter()
        .filter_map(|m| match m {
            Message::Tool(tool) => Some(tool.clone()),
            _ => None,
        })
        .collect()
}
