//! Live event streams backed by a spawned run.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::agent_loop::{LoopRunner, RequestMode, RunEvent, RunRequest};
use crate::error::{ConvoyError, Result};

/// Spawn `request` in streaming mode and expose its events as a stream.
///
/// A failed run yields its error as the last item, including a run whose task
/// panicked. Dropping the stream cancels the run.
pub(crate) fn spawn_event_stream<Ctx: Send + Sync + 'static>(
    runner: Arc<LoopRunner<Ctx>>,
    mut request: RunRequest<Ctx>,
) -> BoxStream<'static, Result<RunEvent>> {
    let (tx, rx) = mpsc::unbounded_channel::<Result<RunEvent>>();

    let cancel = request.cancel.child_token();
    request.cancel = cancel.clone();

    let caller_sink = request.event_sink.take();
    let event_tx = tx.clone();
    request.event_sink = Some(Arc::new(move |event: RunEvent| {
        if let Some(sink) = &caller_sink {
            sink(event.clone());
        }
        let _ = event_tx.send(Ok(event));
    }));

    let run = tokio::spawn(async move { runner.run(request, RequestMode::Streaming).await });
    tokio::spawn(async move {
        let err = match run.await {
            Ok(Ok(_)) => return,
            Ok(Err(err)) => err,
            Err(join) if join.is_panic() => ConvoyError::TaskFailed(join.to_string()),
            Err(_) => ConvoyError::Cancelled,
        };
        tracing::debug!(error = %err, "streaming run failed");
        let _ = tx.send(Err(err));
    });

    let guard = cancel.drop_guard();
    let mut events = UnboundedReceiverStream::new(rx);
    async_stream::stream! {
        let _guard = guard;
        while let Some(item) = events.next().await {
            yield item;
        }
    }
    .boxed()
}
