//! Executing the tool calls of one turn.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent_loop::events::{RunEventEmitter, RunEventPayload};
use crate::agent_loop::guard::NestingDepth;
use crate::agent_loop::types::DispatchMode;
use crate::error::{ConvoyError, Result, ToolError};
use crate::tools::{ToolArguments, ToolExecutionContext, ToolRegistry};
use crate::types::{ToolCall, ToolResult};
use crate::util::timeout::with_timeout;

pub(super) struct DispatchContext<'a, Ctx> {
    pub tools: &'a ToolRegistry<Ctx>,
    pub state: &'a Arc<Ctx>,
    pub depth: NestingDepth,
    pub mode: DispatchMode,
    pub timeout: Duration,
    pub emitter: &'a RunEventEmitter,
    pub cancel: &'a CancellationToken,
}

/// Run every call and return the results in call order.
///
/// Tool failures become error results. Only cancellation aborts the phase.
pub(super) async fn dispatch_tool_calls<Ctx: Send + Sync + 'static>(
    cx: &DispatchContext<'_, Ctx>,
    calls: &[ToolCall],
) -> Result<Vec<ToolResult>> {
    if calls.is_empty() {
        return Ok(Vec::new());
    }

    let work = async {
        match cx.mode {
            DispatchMode::Concurrent => {
                try_join_all(calls.iter().map(|call| execute_tool_call(cx, call))).await
            }
            DispatchMode::Sequential => {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    results.push(execute_tool_call(cx, call).await?);
                }
                Ok(results)
            }
        }
    };

    tokio::select! {
        biased;
        () = cx.cancel.cancelled() => Err(ConvoyError::Cancelled),
        results = work => results,
    }
}

async fn execute_tool_call<Ctx: Send + Sync + 'static>(
    cx: &DispatchContext<'_, Ctx>,
    call: &ToolCall,
) -> Result<ToolResult> {
    // Unregistered names are answered directly and never announced.
    let tool = match cx.tools.get(&call.name) {
        Some(tool) => tool,
        None => {
            let err = ToolError::NotFound {
                available: cx.tools.names().join(", "),
            };
            warn!(tool = %call.name, call_id = %call.id, "tool not registered");
            return Ok(ToolResult::error(err.feedback_message(&call.name)));
        }
    };

    cx.emitter.emit(RunEventPayload::ToolStarted { call: call.clone() });
    let started = Instant::now();
    let call_cancel = cx.cancel.child_token();
    let ctx = ToolExecutionContext {
        state: Arc::clone(cx.state),
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        depth: cx.depth,
        cancel: call_cancel.clone(),
    };
    let args = ToolArguments::new(call.arguments.clone());
    let execution = AssertUnwindSafe(tool.execute(&args, &ctx))
        .catch_unwind()
        .map(|caught| caught.unwrap_or_else(|panic| Err(panicked(&*panic))));
    let outcome = with_timeout(cx.timeout, execution).await;
    if matches!(outcome, Err(ToolError::Timeout { .. })) {
        call_cancel.cancel();
    }

    let result = match outcome {
        Ok(content) => ToolResult::success(content),
        Err(ToolError::Cancelled) => return Err(ConvoyError::Cancelled),
        Err(err) => {
            warn!(tool = %call.name, call_id = %call.id, error = %err, "tool call failed");
            ToolResult::error(err.feedback_message(&call.name))
        }
    };

    debug!(
        tool = %call.name,
        call_id = %call.id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        is_error = result.is_error,
        "tool call finished"
    );
    cx.emitter.emit(RunEventPayload::ToolCompleted {
        call: call.clone(),
        result: result.clone(),
    });
    Ok(result)
}

fn panicked(payload: &(dyn Any + Send)) -> ToolError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ToolError::execution(format!("tool panicked: {message}"))
}
