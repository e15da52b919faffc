// libs/ai-assist-cell/src/services/completion.rs
use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{AiError, ChatMessage};

/// A chat-completion backend. The assistant only ever needs the text of the
/// first choice.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// `json_mode` asks the model for a single JSON object.
    async fn complete(&self, messages: Vec<ChatMessage>, json_mode: bool) -> Result<String, AiError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig) -> Result<Self, AiError> {
        if !config.is_ai_configured() {
            return Err(AiError::NotConfigured);
        }

        Ok(Self {
            http_client: Client::new(),
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, messages: Vec<ChatMessage>, json_mode: bool) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting completion from {} with {} messages", url, messages.len());

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.2
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self.http_client.post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("OpenAI API error: {} - {}", status, error_text);
            return Err(AiError::ProviderError(format!("HTTP {}: {}", status, error_text)));
        }

        let ai_response: Value = response.json().await?;
        ai_response["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| AiError::InvalidResponse("missing choices[0].message.content".to_string()))
    }
}
