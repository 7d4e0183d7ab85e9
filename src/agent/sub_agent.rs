//! An [`Agent`] exposed as a tool of another run.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::agent::Agent;
use crate::agent_loop::RunRequest;
use crate::error::ToolError;
use crate::tools::{AgentToolParameters, Tool, ToolArguments, ToolExecutionContext};

/// Runs a nested agent on `{"task": string}` and returns its final content.
///
/// The nested run shares the parent's context, sits one level deeper, and is
/// cancelled with the parent call. Nested failures come back to the parent
/// model as tool errors.
pub struct SubAgentTool<Ctx = ()> {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    agent: Agent<Ctx>,
    token_budget: Option<u64>,
}

impl<Ctx: Send + Sync + 'static> SubAgentTool<Ctx> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, agent: Agent<Ctx>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: AgentToolParameters::object()
                .string("task", "The task for the sub-agent to complete", true)
                .build(),
            agent,
            token_budget: None,
        }
    }

    /// Cap the nested run's total token usage.
    pub fn with_token_budget(mut self, budget: u64) -> Self {
        self.token_budget = Some(budget);
        self
    }
}

#[async_trait]
impl<Ctx: Send + Sync + 'static> Tool<Ctx> for SubAgentTool<Ctx> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext<Ctx>,
    ) -> Result<String, ToolError> {
        let depth = ctx.depth.descend()?;
        let task = args.get_str("task")?;

        let mut request = RunRequest::with_shared_context(task, Arc::clone(&ctx.state))
            .with_depth(depth)
            .with_cancel_token(ctx.cancel.child_token());
        if let Some(budget) = self.token_budget {
            request = request.with_token_budget(budget);
        }

        debug!(tool = %self.name, depth = depth.current, "starting nested run");
        let result = self.agent.run(request).await?;
        debug!(
            tool = %self.name,
            iterations = result.iteration_count,
            total_tokens = result.total_usage.total(),
            "nested run finished"
        );
        Ok(result.content)
    }
}
