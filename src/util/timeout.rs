//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ToolError;

/// Race a tool future against a timer; the loser is dropped.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ToolError>>,
) -> Result<T, ToolError> {
    tokio::select! {
        result = future => result,
        () = tokio::time::sleep(duration) => Err(ToolError::Timeout {
            timeout_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
