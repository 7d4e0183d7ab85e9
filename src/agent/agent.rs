//! Tool-using agent that runs until it calls its terminal tool.

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

/// An agent whose runs end only through the terminal (`finish`) tool.
///
/// Plain text turns keep the loop going. Tool calls default to concurrent
/// dispatch.
pub struct Agent<Ctx = ()> {
    runner: Arc<LoopRunner<Ctx>>,
}

impl<Ctx: Send + Sync + 'static> Agent<Ctx> {
    /// Create an agent.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        let mut runner = LoopRunner::new(provider, TerminationPolicy::agent());
        runner.set_dispatch_mode(DispatchMode::Concurrent);
        Self {
            runner: Arc::new(runner),
        }
    }

    /// Add a tool.
    pub fn with_tool(mut self, tool: impl Tool<Ctx> + 'static) -> Self {
        Arc::make_mut(&mut self.runner).add_tool(Arc::new(tool));
        self
    }

    /// Replace the tool catalogue.
    pub fn with_tools(mut self, tools: ToolRegistry<Ctx>) -> Self {
        Arc::make_mut(&mut self.runner).set_tools(tools);
        self
    }

    /// Set run config.
    pub fn with_config(mut self, config: RunConfig) -> Self {
        Arc::make_mut(&mut self.runner).set_config(config);
        self
    }

    /// Set system prompt.
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

    /// Rename the terminal tool.
    pub fn with_terminal_tool(mut self, name: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.runner).set_policy(TerminationPolicy::Agent {
            terminal_tool: name.into(),
        });
        self
    }

    pub fn runner(&self) -> &LoopRunner<Ctx> {
        &self.runner
    }

    /// Run to completion with batched requests.
    pub async fn run(&self, request: RunRequest<Ctx>) -> Result<RunResult> {
        self.runner.run(request, RequestMode::Batched).await
    }

    /// Run with streaming requests, yielding live events ending in `Finished`.
    pub fn stream(&self, request: RunRequest<Ctx>) -> BoxStream<'static, Result<RunEvent>> {
        spawn_event_stream(Arc::clone(&self.runner), request)
    }
}

impl<Ctx> Clone for Agent<Ctx> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}
