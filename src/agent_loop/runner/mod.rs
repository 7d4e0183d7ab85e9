//! The orchestration loop: request a turn, dispatch its tools, feed results back.

mod llm_phase;
mod tool_phase;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{ConvoyError, Result};
use crate::provider::{ModelProvider, ProviderRequest};
use crate::tools::{finish_tool_definition, FinishPayload, Tool, ToolDefinition, ToolRegistry};
use crate::types::{AssistantTurn, Message, ResponseFormat, TokenUsage, ToolCall, ToolResult};

use super::events::{RunEvent, RunEventEmitter, RunEventPayload, RunEventSink};
use super::guard::{NestingDepth, TokenBudget};
use super::history::truncate_history;
use super::policy::TerminationPolicy;
use super::types::{DispatchMode, FinishReason, RequestMode, RunId, RunResult};

use tool_phase::DispatchContext;

const SKIPPED_BY_FINISH: &str = "Not executed: the run finished in the same turn.";

/// Input for one run.
pub struct RunRequest<Ctx = ()> {
    pub run_id: RunId,
    /// The new user message appended after `history`.
    pub message: Message,
    pub history: Vec<Message>,
    /// Opaque per-run value handed to every tool call.
    pub context: Arc<Ctx>,
    pub cancel: CancellationToken,
    pub event_sink: Option<RunEventSink>,
    /// Overrides the root depth derived from the runner's config.
    pub depth: Option<NestingDepth>,
    /// Overrides the runner's configured token budget.
    pub token_budget: Option<u64>,
}

impl<Ctx> RunRequest<Ctx> {
    pub fn new(message: impl Into<Message>, context: Ctx) -> Self {
        Self::with_shared_context(message, Arc::new(context))
    }

    pub fn with_shared_context(message: impl Into<Message>, context: Arc<Ctx>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            message: message.into(),
            history: Vec::new(),
            context,
            cancel: CancellationToken::new(),
            event_sink: None,
            depth: None,
            token_budget: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_event_sink(mut self, sink: impl Fn(RunEvent) + Send + Sync + 'static) -> Self {
        self.event_sink = Some(Arc::new(sink));
        self
    }

    pub fn with_depth(mut self, depth: NestingDepth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_token_budget(mut self, budget: u64) -> Self {
        self.token_budget = Some(budget);
        self
    }
}

/// Drives runs against one provider with one tool set and termination policy.
pub struct LoopRunner<Ctx = ()> {
    provider: Arc<dyn ModelProvider>,
    tools: ToolRegistry<Ctx>,
    catalogue: Vec<ToolDefinition>,
    policy: TerminationPolicy,
    dispatch: DispatchMode,
    config: RunConfig,
    response_format: Option<ResponseFormat>,
}

impl<Ctx: Send + Sync + 'static> LoopRunner<Ctx> {
    pub fn new(provider: Arc<dyn ModelProvider>, policy: TerminationPolicy) -> Self {
        let mut runner = Self {
            provider,
            tools: ToolRegistry::new(),
            catalogue: Vec::new(),
            policy,
            dispatch: DispatchMode::default(),
            config: RunConfig::default(),
            response_format: None,
        };
        runner.rebuild_catalogue();
        runner
    }

    pub fn add_tool(&mut self, tool: Arc<dyn Tool<Ctx>>) {
        self.tools.register_arc(tool);
        self.rebuild_catalogue();
    }

    pub fn set_tools(&mut self, tools: ToolRegistry<Ctx>) {
        self.tools = tools;
        self.rebuild_catalogue();
    }

    pub fn set_policy(&mut self, policy: TerminationPolicy) {
        self.policy = policy;
        self.rebuild_catalogue();
    }

    pub fn set_dispatch_mode(&mut self, mode: DispatchMode) {
        self.dispatch = mode;
    }

    pub fn set_config(&mut self, config: RunConfig) {
        self.config = config;
    }

    pub fn set_response_format(&mut self, format: Option<ResponseFormat>) {
        self.response_format = format;
    }

    pub fn policy(&self) -> &TerminationPolicy {
        &self.policy
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry<Ctx> {
        &self.tools
    }

    /// Tool definitions sent with every request.
    pub fn catalogue(&self) -> &[ToolDefinition] {
        &self.catalogue
    }

    fn rebuild_catalogue(&mut self) {
        let mut catalogue = self.tools.definitions();
        if let Some(terminal) = self.policy.terminal_tool() {
            catalogue.push(finish_tool_definition(terminal));
        }
        self.catalogue = catalogue;
    }

    fn check_ready(&self) -> Result<()> {
        self.config.validate()?;
        if let Some(terminal) = self.policy.terminal_tool() {
            if self.tools.contains(terminal) {
                return Err(ConvoyError::Configuration(format!(
                    "tool name '{terminal}' is reserved for ending the run"
                )));
            }
        }
        Ok(())
    }

    /// Execute one run to completion.
    pub async fn run(&self, request: RunRequest<Ctx>, mode: RequestMode) -> Result<RunResult> {
        self.check_ready()?;

        let RunRequest {
            run_id,
            message,
            history,
            context,
            cancel,
            event_sink,
            depth,
            token_budget,
        } = request;

        let depth = depth.unwrap_or_else(|| NestingDepth::root(self.config.max_depth));
        let budget = token_budget.or(self.config.token_budget).map(TokenBudget::new);
        let emitter = RunEventEmitter::new(run_id, event_sink);

        let mut messages = history;
        if let Some(prompt) = &self.config.system_prompt {
            if !messages.iter().any(Message::is_system) {
                messages.insert(0, Message::system(prompt.clone()));
            }
        }
        messages.push(message);

        let span = tracing::info_span!(
            "convoy_run",
            run_id = %run_id,
            policy = ?self.policy,
            mode = %mode,
            dispatch = %self.dispatch,
            depth = depth.current,
            iteration = tracing::field::Empty,
        );

        let state = LoopState {
            run_id,
            messages,
            total_usage: TokenUsage::default(),
            context,
            cancel,
            depth,
            budget,
            emitter,
        };
        self.drive(state, mode).instrument(span).await
    }

    async fn drive(&self, mut state: LoopState<Ctx>, mode: RequestMode) -> Result<RunResult> {
        let max_iterations = self.config.max_iterations;

        for iteration in 1..=max_iterations {
            tracing::Span::current().record("iteration", iteration);
            if state.cancel.is_cancelled() {
                return Err(ConvoyError::Cancelled);
            }

            let outbound = match self.config.max_messages {
                Some(max) => truncate_history(&state.messages, max),
                None => state.messages.clone(),
            };
            let request = ProviderRequest {
                messages: outbound,
                tools: self.catalogue.clone(),
                response_format: self.response_format.clone(),
            };
            debug!(iteration, messages = request.messages.len(), "requesting turn");

            let turn = llm_phase::request_turn(
                self.provider.as_ref(),
                &request,
                mode,
                &state.emitter,
                &state.cancel,
            )
            .await?;

            if let Some(usage) = &turn.usage {
                state.total_usage.merge(usage);
            }
            state.messages.push(Message::Assistant(turn.clone()));
            if let Some(budget) = &state.budget {
                budget.check(&state.total_usage)?;
            }

            if self.policy.should_terminate(&turn) {
                return self.complete(state, &turn, iteration);
            }

            let calls: Vec<ToolCall> = self
                .policy
                .executable_calls(&turn)
                .into_iter()
                .cloned()
                .collect();
            debug!(iteration, tool_calls = calls.len(), "dispatching tools");

            let dispatch = DispatchContext {
                tools: &self.tools,
                state: &state.context,
                depth: state.depth,
                mode: self.dispatch,
                timeout: self.config.per_tool_timeout,
                emitter: &state.emitter,
                cancel: &state.cancel,
            };
            let results = tool_phase::dispatch_tool_calls(&dispatch, &calls).await?;
            for (call, result) in calls.iter().zip(results) {
                state.messages.push(Message::tool_result(call, result));
            }
        }

        warn!(max_iterations, "run reached its iteration limit");
        Err(ConvoyError::IterationLimit { max_iterations })
    }

    fn complete(&self, mut state: LoopState<Ctx>, turn: &AssistantTurn, iteration: usize) -> Result<RunResult> {
        let (finish_reason, content, finish_note) = match self.policy.terminal_call(turn) {
            Some(terminal) => {
                let payload = FinishPayload::parse(&terminal.arguments)?;
                // Answer every call of the final turn so the log stays replayable.
                for call in &turn.tool_calls {
                    let result = if call.id == terminal.id {
                        ToolResult::success(payload.content.clone())
                    } else {
                        ToolResult::error(SKIPPED_BY_FINISH)
                    };
                    state.messages.push(Message::tool_result(call, result));
                }
                (FinishReason::FinishTool, payload.content, payload.reason)
            }
            None => (FinishReason::NoToolCalls, turn.content.clone(), None),
        };

        debug!(iteration, %finish_reason, total_tokens = state.total_usage.total(), "run completed");

        state.emitter.emit(RunEventPayload::Finished {
            usage: state.total_usage,
            content: content.clone(),
            finish_reason,
            history: state.messages.clone(),
        });

        Ok(RunResult {
            run_id: state.run_id,
            finish_reason,
            finish_note,
            content,
            total_usage: state.total_usage,
            iteration_count: iteration,
            history: state.messages,
            finished_at: chrono::Utc::now(),
        })
    }
}

impl<Ctx> Clone for LoopRunner<Ctx> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            tools: self.tools.clone(),
            catalogue: self.catalogue.clone(),
            policy: self.policy.clone(),
            dispatch: self.dispatch,
            config: self.config.clone(),
            response_format: self.response_format.clone(),
        }
    }
}

struct LoopState<Ctx> {
    run_id: RunId,
    messages: Vec<Message>,
    total_usage: TokenUsage,
    context: Arc<Ctx>,
    cancel: CancellationToken,
    depth: NestingDepth,
    budget: Option<TokenBudget>,
    emitter: RunEventEmitter,
}
