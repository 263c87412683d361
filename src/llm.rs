use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::prompt::{PromptMessage, Role};

/// Sampling temperature for every completion; generation must be deterministic.
pub const TEMPERATURE: f32 = 0.0;

/// Single-shot text completion over a rendered prompt. No streaming and no
/// history is kept between calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String>;
}

pub struct OllamaModel {
    client: Ollama,
    model: String,
}

impl OllamaModel {
    /// `host` must already be an http(s) url with a host; see
    /// `config::parse_ollama_host`.
    pub fn new(host: Url, port: u16, model: impl Into<String>) -> Self {
        Self {
            client: Ollama::new(host, port),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        let messages = messages.iter().map(to_chat_message).collect();
        let request = ChatMessageRequest::new(self.model.clone(), messages)
            .options(ModelOptions::default().temperature(TEMPERATURE));

        debug!(model = %self.model, "Sending chat request");

        let response = self.client.send_chat_messages(request).await?;

        Ok(response.message.content)
    }
}

fn to_chat_message(message: &PromptMessage) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::Human => ChatMessage::user(message.content.clone()),
    }
}
