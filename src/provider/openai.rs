//! OpenAI-compatible Chat Completions provider (OpenAI, OpenRouter, DeepSeek).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ConvoyError;
use crate::types::*;
use crate::util::retry::RetryPolicy;

use super::http::{bearer_headers, error_from_response, parse_sse_line, shared_client, SseEvent, SseLineBuffer};
use super::{ModelProvider, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Base URL for a known OpenAI-compatible provider.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some(DEFAULT_BASE_URL),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        _ => None,
    }
}

pub struct OpenAiProvider {
    provider_name: String,
    model: String,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            provider_name: "openai".to_string(),
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request_body(&self, request: &ProviderRequest, stream: bool) -> Value {
        let forward_reasoning = self.provider_name == "openrouter";
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| message_to_openai(m, forward_reasoning))
            .collect();

        let mut body = serde_json::Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert("messages".into(), Value::Array(messages));
        body.insert("stream".into(), json!(stream));
        if stream {
            body.insert("stream_options".into(), json!({"include_usage": true}));
        }

        if !request.tools.is_empty() {
            let tool_defs: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(tool_defs));
        }

        match &request.response_format {
            Some(ResponseFormat::JsonObject) => {
                body.insert("response_format".into(), json!({"type": "json_object"}));
            }
            Some(ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            }) => {
                body.insert(
                    "response_format".into(),
                    json!({
                        "type": "json_schema",
                        "json_schema": {"name": name, "schema": schema, "strict": strict},
                    }),
                );
            }
            Some(ResponseFormat::Text) | None => {}
        }

        Value::Object(body)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ConvoyError> {
        let url = format!("{}/chat/completions", self.base_url);
        self.retry
            .execute(|| async {
                let resp = shared_client()
                    .post(&url)
                    .headers(bearer_headers(&self.api_key))
                    .json(body)
                    .send()
                    .await?;
                if resp.status().is_success() {
                    Ok(resp)
                } else {
                    Err(error_from_response(resp).await)
                }
            })
            .await
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<AssistantTurn, ConvoyError> {
        let body = self.build_request_body(request, false);
        debug!(provider = %self.provider_name, model = %self.model, "chat completion");

        let data: ChatResponse = self.post(&body).await?.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ConvoyError::api(200, "No choices in chat completion response"))?;
        let message = choice.message;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let reasoning_details = message
            .reasoning_details
            .map(crate::delta::consolidate_reasoning_details)
            .filter(|details| !details.is_empty());

        Ok(AssistantTurn {
            content: message.content.unwrap_or_default(),
            tool_calls,
            usage: data.usage.map(ApiUsage::into_usage),
            reasoning_content: message
                .reasoning_content
                .or(message.reasoning)
                .filter(|text| !text.is_empty()),
            reasoning_details,
        })
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, ConvoyError>>, ConvoyError> {
        let body = self.build_request_body(request, true);
        debug!(provider = %self.provider_name, model = %self.model, "streaming chat completion");

        let byte_stream = self.post(&body).await?.bytes_stream();

        let stream = async_stream::stream! {
            let mut byte_stream = std::pin::pin!(byte_stream);
            let mut lines = SseLineBuffer::default();
            let mut usage: Option<TokenUsage> = None;
            let mut saw_done = false;

            'read: while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ConvoyError::Network(e));
                        return;
                    }
                };
                for line in lines.push(&bytes) {
                    match handle_line(&line, &mut usage) {
                        LineOutcome::Skip => {}
                        LineOutcome::Done => {
                            saw_done = true;
                            break 'read;
                        }
                        LineOutcome::Deltas(deltas) => {
                            for delta in deltas {
                                yield Ok(delta);
                            }
                        }
                        LineOutcome::Error(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if !saw_done {
                debug!("stream closed without [DONE]");
                if let Some(line) = lines.finish() {
                    match handle_line(&line, &mut usage) {
                        LineOutcome::Deltas(deltas) => {
                            for delta in deltas {
                                yield Ok(delta);
                            }
                        }
                        LineOutcome::Error(e) => {
                            yield Err(e);
                            return;
                        }
                        LineOutcome::Skip | LineOutcome::Done => {}
                    }
                }
            }
            yield Ok(StreamDelta::finished(usage));
        };

        Ok(Box::pin(stream))
    }
}

enum LineOutcome {
    Skip,
    Done,
    Deltas(Vec<StreamDelta>),
    Error(ConvoyError),
}

fn handle_line(line: &str, usage: &mut Option<TokenUsage>) -> LineOutcome {
    let data = match parse_sse_line(line) {
        None => return LineOutcome::Skip,
        Some(SseEvent::Done) => return LineOutcome::Done,
        Some(SseEvent::Data(data)) => data,
    };
    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => return LineOutcome::Error(ConvoyError::Stream(format!("unparseable chunk: {e}"))),
    };
    if let Some(error) = chunk.error {
        return LineOutcome::Error(ConvoyError::Stream(error.to_string()));
    }
    if let Some(chunk_usage) = chunk.usage {
        *usage = Some(chunk_usage.into_usage());
    }
    LineOutcome::Deltas(chunk_deltas(chunk.choices))
}

fn chunk_deltas(choices: Vec<StreamChoice>) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    let Some(choice) = choices.into_iter().next() else {
        return deltas;
    };
    let delta = choice.delta;

    if let Some(text) = delta.reasoning_content.or(delta.reasoning) {
        if !text.is_empty() {
            deltas.push(StreamDelta::Reasoning { text });
        }
    }
    if let Some(details) = delta.reasoning_details {
        if !details.is_empty() {
            deltas.push(StreamDelta::ReasoningDetails { details });
        }
    }
    if let Some(text) = delta.content {
        if !text.is_empty() {
            deltas.push(StreamDelta::Content { text });
        }
    }
    for call in delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match call.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };
        if let Some(id) = call.id.filter(|id| !id.is_empty()) {
            deltas.push(StreamDelta::ToolCallStart {
                index: call.index,
                id,
                name: name.unwrap_or_default(),
            });
        }
        if let Some(fragment) = arguments.filter(|a| !a.is_empty()) {
            deltas.push(StreamDelta::ToolCallDelta {
                index: call.index,
                fragment,
            });
        }
    }
    deltas
}

fn message_to_openai(msg: &Message, forward_reasoning: bool) -> Value {
    match msg {
        Message::System { content } => json!({"role": "system", "content": content}),
        Message::User { content } => match content {
            UserContent::Text(text) => json!({"role": "user", "content": text}),
            UserContent::Parts(parts) => {
                let parts: Vec<Value> = parts.iter().map(content_part_to_openai).collect();
                json!({"role": "user", "content": parts})
            }
        },
        Message::Assistant(turn) => {
            let mut out = serde_json::Map::new();
            out.insert("role".into(), json!("assistant"));
            out.insert(
                "content".into(),
                if turn.content.is_empty() {
                    Value::Null
                } else {
                    json!(turn.content)
                },
            );
            if !turn.tool_calls.is_empty() {
                let calls: Vec<Value> = turn
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {"name": tc.name, "arguments": tc.arguments},
                        })
                    })
                    .collect();
                out.insert("tool_calls".into(), Value::Array(calls));
            }
            if forward_reasoning {
                if let Some(details) = &turn.reasoning_details {
                    out.insert("reasoning_details".into(), json!(details));
                }
            }
            Value::Object(out)
        }
        Message::Tool(tool) => json!({
            "role": "tool",
            "tool_call_id": tool.tool_call_id,
            "content": tool.content,
        }),
    }
}

fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(data))
}

fn content_part_to_openai(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({"type": "text", "text": text}),
        ContentPart::Image { source } => {
            let url = match source {
                ImageSource::Url { url } => url.clone(),
                ImageSource::Inline { data, mime_type } => data_url(mime_type, data),
            };
            json!({"type": "image_url", "image_url": {"url": url}})
        }
        ContentPart::Audio { data, format } => json!({
            "type": "input_audio",
            "input_audio": {"data": STANDARD.encode(data), "format": format},
        }),
        ContentPart::Video { data, mime_type } => json!({
            "type": "file",
            "file": {"file_data": data_url(mime_type, data)},
        }),
        ContentPart::Document {
            data,
            mime_type,
            name,
        } => {
            let mut file = serde_json::Map::new();
            file.insert("file_data".into(), json!(data_url(mime_type, data)));
            if let Some(name) = name {
                file.insert("filename".into(), json!(name));
            }
            json!({"type": "file", "file": file})
        }
    }
}

// Chat Completions wire types (internal)

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    reasoning_details: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize)]
struct CompletionTokensDetails {
    reasoning_tokens: Option<u64>,
}

impl ApiUsage {
    /// `completion_tokens` already includes reasoning; split it out so totals don't double count.
    fn into_usage(self) -> TokenUsage {
        let reasoning = self
            .completion_tokens_details
            .and_then(|d| d.reasoning_tokens)
            .unwrap_or(0);
        TokenUsage {
            input: self.prompt_tokens,
            output: self.completion_tokens.saturating_sub(reasoning),
            reasoning,
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    reasoning_details: Option<Vec<Value>>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Deserialize)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}
