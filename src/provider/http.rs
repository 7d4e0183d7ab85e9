//! Shared HTTP client, SSE parsing, and auth utilities.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};

use crate::error::ConvoyError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// One meaningful SSE line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent<'a> {
    Data(&'a str),
    Done,
}

/// Parse an SSE line; comments, blank lines and non-data fields yield `None`.
pub fn parse_sse_line(line: &str) -> Option<SseEvent<'_>> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        Some(SseEvent::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(SseEvent::Data(data))
    }
}

/// Splits a byte stream into text lines, tolerating chunk boundaries inside UTF-8 sequences.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Append bytes, returning every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        lines
    }

    /// Any trailing line not terminated by a newline.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Turn a non-success response into an error, consuming its body.
pub async fn error_from_response(resp: reqwest::Response) -> ConvoyError {
    let status = resp.status().as_u16();
    let header_retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64);
    let body = resp.text().await.unwrap_or_default();
    match status_to_error(status, &body) {
        ConvoyError::RateLimited { retry_after_ms } => ConvoyError::RateLimited {
            retry_after_ms: retry_after_ms.or(header_retry_after),
        },
        other => other,
    }
}

/// Map an HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> ConvoyError {
    match status {
        401 | 403 => ConvoyError::Authentication(body.to_string()),
        429 => ConvoyError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => ConvoyError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines() {
        assert_eq!(parse_sse_line("data: {\"a\":1}"), Some(SseEvent::Data("{\"a\":1}")));
        assert_eq!(parse_sse_line("data:[DONE]"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
    }

    #[test]
    fn line_buffer_handles_split_utf8() {
        let mut buffer = SseLineBuffer::default();
        let text = "data: é\n".as_bytes();
        assert!(buffer.push(&text[..7]).is_empty());
        assert_eq!(buffer.push(&text[7..]), vec!["data: é".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn statuses_map_to_categories() {
        assert!(matches!(status_to_error(401, "no"), ConvoyError::Authentication(_)));
        assert!(matches!(
            status_to_error(429, r#"{"error":{"retry_after":1.5}}"#),
            ConvoyError::RateLimited { retry_after_ms: Some(1500) }
        ));
        assert!(status_to_error(502, "bad gateway").is_retryable());
        assert!(!status_to_error(400, "bad request").is_retryable());
    }
}
