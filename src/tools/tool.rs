//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{AgentToolParameters, ToolDefinition};
use crate::agent_loop::guard::NestingDepth;
use crate::error::ToolError;

/// Context available during tool execution.
///
/// `state` is the caller's per-run value, shared by every tool call of the run
/// and handed through untouched.
pub struct ToolExecutionContext<Ctx> {
    pub state: Arc<Ctx>,
    pub tool_call_id: String,
    pub tool_name: String,
    /// Nesting position of the run that issued this call.
    pub depth: NestingDepth,
    /// Cancelled when the run is cancelled or this call times out.
    pub cancel: CancellationToken,
}

impl<Ctx> ToolExecutionContext<Ctx> {
    /// Context for invoking a tool outside a run.
    pub fn new(state: Arc<Ctx>) -> Self {
        Self {
            state,
            tool_call_id: String::new(),
            tool_name: String::new(),
            depth: NestingDepth::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &Ctx {
        &self.state
    }
}

impl<Ctx> Clone for ToolExecutionContext<Ctx> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            tool_call_id: self.tool_call_id.clone(),
            tool_name: self.tool_name.clone(),
            depth: self.depth,
            cancel: self.cancel.clone(),
        }
    }
}

impl<Ctx> std::fmt::Debug for ToolExecutionContext<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutionContext")
            .field("tool_call_id", &self.tool_call_id)
            .field("tool_name", &self.tool_name)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

/// Core tool trait. Implement it to create custom tools.
#[async_trait]
pub trait Tool<Ctx: Send + Sync + 'static = ()>: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &AgentToolParameters;

    /// Catalogue entry sent to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }

    /// Execute the tool, returning the result text fed back to the model.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext<Ctx>,
    ) -> Result<String, ToolError>;
}

type ToolHandler<Ctx> = dyn Fn(ToolArguments, ToolExecutionContext<Ctx>) -> BoxFuture<'static, Result<String, ToolError>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool<Ctx = ()> {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    handler: Arc<ToolHandler<Ctx>>,
}

impl<Ctx: Send + Sync + 'static> AgentTool<Ctx> {
    /// Create a tool from a closure over raw arguments.
    ///
    /// A returned JSON string is used verbatim; any other value is sent as JSON text.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args: ToolArguments, ctx: ToolExecutionContext<Ctx>| {
                let fut = handler(args, ctx);
                async move { encode_output(fut.await?) }.boxed()
            }),
        }
    }

    /// Create a tool whose arguments and output are typed.
    ///
    /// Arguments that do not decode into `A` never reach the handler.
    pub fn typed<A, O, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(A, ToolExecutionContext<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args: ToolArguments, ctx: ToolExecutionContext<Ctx>| match args.deserialize::<A>() {
                Err(err) => std::future::ready(Err(err)).boxed(),
                Ok(input) => {
                    let fut = handler(input, ctx);
                    async move {
                        let output = fut.await?;
                        let value = serde_json::to_value(&output)
                            .map_err(|e| ToolError::OutputEncode(e.to_string()))?;
                        encode_output(value)
                    }
                    .boxed()
                }
            }),
        }
    }
}

fn encode_output(value: serde_json::Value) -> Result<String, ToolError> {
    match value {
        serde_json::Value::String(text) => Ok(text),
        other => serde_json::to_string(&other).map_err(|e| ToolError::OutputEncode(e.to_string())),
    }
}

#[async_trait]
impl<Ctx: Send + Sync + 'static> Tool<Ctx> for AgentTool<Ctx> {
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
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl<Ctx> std::fmt::Debug for AgentTool<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
