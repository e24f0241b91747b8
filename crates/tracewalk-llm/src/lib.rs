pub mod providers;
pub mod retry;
pub mod streaming;

use futures::StreamExt;

use tracewalk_core::config::{AppConfig, ModelConfig};
use tracewalk_core::error::{Result, TracewalkError};
use tracewalk_core::traits::LlmClient;
use tracewalk_core::types::{ChatMessage, StreamDelta};

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "ollama" | "vllm" | "groq" | "openrouter" | "together" => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other if config.base_url.is_some() => {
            tracing::debug!(provider = %other, "Treating provider as OpenAI-compatible");
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(TracewalkError::Config(format!(
            "unsupported provider '{}' (set base_url for OpenAI-compatible endpoints)",
            other
        ))),
    }
}

/// Build the client used by every oracle: the primary model wrapped with
/// retry and any configured fallbacks.
pub fn build_client(config: &AppConfig) -> Result<RetryingClient> {
    let primary = create_client(&config.model)?;
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| create_client(fb).map(|client| (fb.clone(), client)))
        .collect::<Result<Vec<_>>>()?;
    let retry = config.model.retry.clone().unwrap_or_default();
    Ok(RetryingClient::new(primary, fallbacks, retry))
}

/// Run a chat request to completion and return the concatenated text.
pub async fn complete_text(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
) -> Result<String> {
    let mut stream = llm.chat_stream(config, messages).await?;

    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        if let StreamDelta::TextDelta(chunk) = delta? {
            text.push_str(&chunk);
        }
    }
    Ok(text)
}
