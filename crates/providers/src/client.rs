//! Conversation-aware LLM client.
//!
//! `LlmClient` owns the bounded conversation history and the provider
//! adapter. Callers send one message at a time; the pending message is
//! appended to the outgoing request but only committed to history via
//! [`LlmClient::update_conversation`], so a failed exchange leaves the
//! history untouched.

use crate::adapter::FallbackAdapter;
use oxpilot_config::AppConfig;
use oxpilot_core::error::ProviderError;
use oxpilot_core::message::{Conversation, Message};
use oxpilot_core::provider::{CompletionRequest, Provider};
use std::sync::Arc;
use tracing::{debug, info};

pub struct LlmClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    conversation: Conversation,
}

impl LlmClient {
    /// Build a client for the config's default provider.
    pub fn new(config: &AppConfig) -> Result<Self, ProviderError> {
        let provider = FallbackAdapter::from_app_config(config)?;
        Ok(Self::with_provider(
            provider,
            &config.defaults.model,
            config.defaults.temperature,
            config.defaults.max_tokens,
        ))
    }

    /// Build a client around any provider (test seam).
    pub fn with_provider(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens,
            conversation: Conversation::new(),
        }
    }

    fn build_request(&self, message: &str) -> CompletionRequest {
        let mut messages = self.conversation.snapshot().to_vec();
        messages.push(Message::user(message));

        CompletionRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Send a message and return the complete response text.
    pub async fn send(&self, message: &str) -> Result<String, ProviderError> {
        debug!(provider = %self.provider.name(), model = %self.model, len = message.len(), "Sending message");
        let response = self.provider.complete(self.build_request(message)).await?;
        debug!(provider = %self.provider.name(), len = response.len(), "Received response");
        Ok(response)
    }

    /// Send a message and receive response fragments as they arrive.
    ///
    /// Fragments already delivered before a mid-stream error stand; the error
    /// arrives as the final item before the stream closes.
    pub async fn stream_message(
        &self,
        message: &str,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<String, ProviderError>>,
        ProviderError,
    > {
        debug!(provider = %self.provider.name(), model = %self.model, len = message.len(), "Sending streaming message");
        self.provider
            .stream(self.build_request(message).streaming())
            .await
    }

    /// Commit a user/assistant exchange into the bounded history.
    pub fn update_conversation(&mut self, user: &str, assistant: &str) {
        self.conversation.push_exchange(user, assistant);
    }

    /// Install a system message, replacing any previous one.
    pub fn add_system_message(&mut self, content: &str) {
        self.conversation.add_system_message(content);
    }

    /// Clear all conversation history.
    pub fn reset_conversation(&mut self) {
        self.conversation.reset();
        info!("Conversation history has been reset");
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn switch_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        info!(model = %self.model, "Switched model");
    }

    /// List models available on the provider.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.provider.list_models().await
    }
}
