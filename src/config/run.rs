//! Per-run limits and defaults.

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConvoyError;

pub const DEFAULT_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_DEPTH: usize = 3;

const MAX_ITERATIONS_ENV: &str = "CONVOY_MAX_ITERATIONS";
const TOOL_TIMEOUT_MS_ENV: &str = "CONVOY_TOOL_TIMEOUT_MS";
const MAX_MESSAGES_ENV: &str = "CONVOY_MAX_MESSAGES";
const MAX_DEPTH_ENV: &str = "CONVOY_MAX_DEPTH";

/// Limits and defaults applied to every run of an agent or chat.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Model requests allowed per run before it fails.
    #[builder(default = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,
    /// Wall-clock limit for each tool call.
    #[builder(default = DEFAULT_TOOL_TIMEOUT)]
    #[serde(rename = "per_tool_timeout_ms", with = "duration_ms")]
    pub per_tool_timeout: Duration,
    /// Inserted at the front when the history carries no system message.
    #[builder(into)]
    pub system_prompt: Option<String>,
    /// Outbound history is truncated to roughly this many messages.
    pub max_messages: Option<usize>,
    /// Nesting limit for sub-agent tools.
    #[builder(default = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,
    /// Total tokens a run may spend.
    pub token_budget: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            per_tool_timeout: DEFAULT_TOOL_TIMEOUT,
            system_prompt: None,
            max_messages: None,
            max_depth: DEFAULT_MAX_DEPTH,
            token_budget: None,
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `CONVOY_*` environment variables.
    ///
    /// Values that are not positive integers are ignored.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Some(value) = env_positive(MAX_ITERATIONS_ENV) {
            config.max_iterations = value;
        }
        if let Some(ms) = env_positive(TOOL_TIMEOUT_MS_ENV) {
            config.per_tool_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(value) = env_positive(MAX_MESSAGES_ENV) {
            config.max_messages = Some(value);
        }
        if let Some(value) = env_positive(MAX_DEPTH_ENV) {
            config.max_depth = value;
        }
        config
    }

    pub fn validate(&self) -> Result<(), ConvoyError> {
        if self.max_iterations == 0 {
            return Err(ConvoyError::Configuration(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.per_tool_timeout.is_zero() {
            return Err(ConvoyError::Configuration(
                "per_tool_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn env_positive(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse_positive(&raw);
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring non-positive run limit");
    }
    parsed
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|value| *value > 0)
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let config = RunConfig::builder().max_iterations(3).build();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.per_tool_timeout, DEFAULT_TOOL_TIMEOUT);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.system_prompt, None);
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let config = RunConfig::builder().max_iterations(0).build();
        assert!(matches!(config.validate(), Err(ConvoyError::Configuration(_))));
    }

    #[test]
    fn serde_uses_milliseconds_and_fills_missing_fields() {
        let config: RunConfig =
            serde_json::from_str(r#"{"per_tool_timeout_ms": 1500, "max_messages": 40}"#).unwrap();
        assert_eq!(config.per_tool_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_messages, Some(40));
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn only_positive_integers_parse() {
        assert_eq!(parse_positive(" 12 "), Some(12));
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("-3"), None);
        assert_eq!(parse_positive("lots"), None);
    }
}
