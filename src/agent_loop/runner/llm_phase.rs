//! Obtaining one assistant turn from the provider.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::agent_loop::events::{RunEventEmitter, RunEventPayload};
use crate::agent_loop::types::RequestMode;
use crate::delta::{DeltaAccumulator, LiveDelta};
use crate::error::{ConvoyError, Result};
use crate::provider::{ModelProvider, ProviderRequest};
use crate::types::AssistantTurn;

/// Request a turn, racing every await against `cancel`.
///
/// Streaming requests surface live text through `emitter` as fragments arrive.
pub(super) async fn request_turn(
    provider: &dyn ModelProvider,
    request: &ProviderRequest,
    mode: RequestMode,
    emitter: &RunEventEmitter,
    cancel: &CancellationToken,
) -> Result<AssistantTurn> {
    match mode {
        RequestMode::Batched => tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ConvoyError::Cancelled),
            turn = provider.generate(request) => turn,
        },
        RequestMode::Streaming => {
            let mut stream = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ConvoyError::Cancelled),
                stream = provider.stream(request) => stream?,
            };

            let mut accumulator = DeltaAccumulator::new();
            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ConvoyError::Cancelled),
                    next = stream.next() => next,
                };
                let Some(item) = next else {
                    break;
                };
                match accumulator.push(item?) {
                    Some(LiveDelta::Text(text)) => emitter.emit(RunEventPayload::TextDelta { text }),
                    Some(LiveDelta::Reasoning(text)) => {
                        emitter.emit(RunEventPayload::ReasoningDelta { text })
                    }
                    None => {}
                }
            }
            accumulator.finish()
        }
    }
}
