//! Model transport trait and implementations.
//!
//! The runtime talks to a model only through [`ModelProvider`]. HTTP, retry and
//! wire framing belong to the implementation.

pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::ConvoyConfig;
use crate::error::ConvoyError;
use crate::tools::ToolDefinition;
use crate::types::{AssistantTurn, Message, ResponseFormat, StreamDelta};

/// A request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub response_format: Option<ResponseFormat>,
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "openrouter").
    fn provider_name(&self) -> &str;

    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// One batched turn.
    async fn generate(&self, request: &ProviderRequest) -> Result<AssistantTurn, ConvoyError>;

    /// One streamed turn. The stream ends after a `Finished` fragment or an error.
    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, ConvoyError>>, ConvoyError>;
}

/// Create a provider by name, using credentials from `config`.
#[allow(unused_variables)]
pub fn create_provider(
    config: &ConvoyConfig,
    provider: &str,
    model: &str,
) -> Result<Box<dyn ModelProvider>, ConvoyError> {
    match provider {
        #[cfg(feature = "openai")]
        "openai" | "openrouter" | "deepseek" => {
            let api_key = config.get_api_key(provider).ok_or_else(|| {
                ConvoyError::Authentication(format!("Missing API key for provider '{provider}'"))
            })?;
            let base_url = config
                .get_base_url(provider)
                .or_else(|| openai::default_base_url(provider).map(str::to_string));
            Ok(Box::new(
                openai::OpenAiProvider::new(model, api_key, base_url).with_provider_name(provider),
            ))
        }
        other => Err(ConvoyError::Configuration(format!(
            "Unknown or disabled provider: {other}"
        ))),
    }
}
