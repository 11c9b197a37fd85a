//! OpenAI-compatible LLM client using the `async-openai` crate.
//!
//! Compatible with any endpoint following the OpenAI chat completion spec
//! (OpenAI, local inference servers, proxies) via the base URL override.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use crate::error::LlmError;

use super::LlmClient;

/// Default completion model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default maximum completion tokens.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Configuration for the OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key.
    pub api_key: String,
    /// Base URL override for compatible endpoints.
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl LlmConfig {
    /// Builds configuration from environment variables.
    ///
    /// Reads `OPENAI_API_KEY` (or `MNEMO_LLM_API_KEY`), `OPENAI_BASE_URL`
    /// (or `MNEMO_LLM_BASE_URL`), and `MNEMO_LLM_MODEL`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ApiKeyMissing`] when no key is set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("MNEMO_LLM_API_KEY"))
            .map_err(|_| LlmError::ApiKeyMissing)?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .or_else(|_| std::env::var("MNEMO_LLM_BASE_URL"))
            .ok();
        let model = std::env::var("MNEMO_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self {
            api_key,
            base_url,
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.1,
        })
    }
}

/// OpenAI-compatible chat client.
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Creates a client from configuration.
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate_response(
        &self,
        query: &str,
        context: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
        if let Some(context) = context {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(context.to_string()),
                    name: None,
                },
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(query.to_string()),
                name: None,
            },
        ));

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_completion_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::ApiRequest {
                message: e.to_string(),
                status: None,
            })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
