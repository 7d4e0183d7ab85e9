//! Conversational binding: a run ends on the first reply without tool calls.

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::agent_loop::{
    DispatchMode, LoopRunner, RequestMode, RunEvent, RunRequest, RunResult, TerminationPolicy,
};
use crate::config::RunConfig;
use crate::error::Result;
use crate::provider::ModelProvider;
use crate::tools::{Tool, ToolRegistry};
use crate::types::ResponseFormat;

use super::live::spawn_event_stream;

/// Chat session over a provider. Tool calls run one at a time by default.
pub struct Chat<Ctx = ()> {
    runner: Arc<LoopRunner<Ctx>>,
}

impl<Ctx: Send + Sync + 'static> Chat<Ctx> {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        let mut runner = LoopRunner::new(provider, TerminationPolicy::chat());
        runner.set_dispatch_mode(DispatchMode::Sequential);
        Self {
            runner: Arc::new(runner),
        }
    }

    pub fn with_tool(mut self, tool: impl Tool<Ctx> + 'static) -> Self {
        Arc::make_mut(&mut self.runner).add_tool(Arc::new(tool));
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry<Ctx>) -> Self {
        Arc::make_mut(&mut self.runner).set_tools(tools);
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        Arc::make_mut(&mut self.runner).set_config(config);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let runner = Arc::make_mut(&mut self.runner);
        let mut config = runner.config().clone();
        config.system_prompt = Some(prompt.into());
        runner.set_config(config);
        self
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        Arc::make_mut(&mut self.runner).set_dispatch_mode(mode);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        Arc::make_mut(&mut self.runner).set_response_format(Some(format));
        self
    }

    pub fn runner(&self) -> &LoopRunner<Ctx> {
        &self.runner
    }

    /// Send a message and wait for the final reply.
    pub async fn send(&self, request: RunRequest<Ctx>) -> Result<RunResult> {
        self.runner.run(request, RequestMode::Batched).await
    }

    /// Send a message and stream the reply as it is produced.
    pub fn stream(&self, request: RunRequest<Ctx>) -> BoxStream<'static, Result<RunEvent>> {
        spawn_event_stream(Arc::clone(&self.runner), request)
    }
}

impl<Ctx> Clone for Chat<Ctx> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}
