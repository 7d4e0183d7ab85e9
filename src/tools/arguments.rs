//! Typed access to tool call arguments.

use std::sync::OnceLock;

use serde_json::Value;

use crate::error::ToolError;

/// Raw JSON arguments of one tool call, parsed on first access.
///
/// Blank text is treated as an empty object.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    raw: String,
    parsed: OnceLock<Result<Value, String>>,
}

impl ToolArguments {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            parsed: OnceLock::new(),
        }
    }

    /// The raw JSON text as sent by the model.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed JSON value.
    pub fn value(&self) -> Result<&Value, ToolError> {
        self.parsed
            .get_or_init(|| {
                let trimmed = self.raw.trim();
                if trimmed.is_empty() {
                    return Ok(Value::Object(Default::default()));
                }
                serde_json::from_str(trimmed).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| ToolError::ArgumentDecode(e.clone()))
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, ToolError> {
        self.value()?
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::ArgumentDecode(format!("missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value().ok()?.get(key).and_then(Value::as_str)
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.value()?
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| ToolError::ArgumentDecode(format!("missing integer argument: {key}")))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, ToolError> {
        self.value()?
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::ArgumentDecode(format!("missing number argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, ToolError> {
        self.value()?
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| ToolError::ArgumentDecode(format!("missing boolean argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ToolError> {
        T::deserialize(self.value()?).map_err(|e| ToolError::ArgumentDecode(e.to_string()))
    }
}
