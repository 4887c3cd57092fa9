//! OpenAI ChatCompletions API types.

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, InvocationRequest, RelayConfig, ResponseFormat};

/// Body of `POST {base}/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    /// Merge per-call options over the configured defaults.
    pub fn from_request(request: &InvocationRequest, config: &RelayConfig) -> Self {
        let options = &request.options;
        Self {
            model: options.model.clone().unwrap_or_else(|| config.default_model.clone()),
            messages: request.messages.clone(),
            temperature: options.temperature.unwrap_or(config.default_temperature),
            max_tokens: options.max_tokens.unwrap_or(config.default_max_tokens),
            response_format: request.response_format.clone(),
        }
    }
}

/// OpenAI usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub refusal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: ReplyMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Reply of `POST {base}/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if the provider produced one.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_deref())
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.as_ref().map_or(0, |u| u.total_tokens)
    }
}
