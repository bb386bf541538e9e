//! OpenAI-compatible provider implementation.
//!
//! Works against any endpoint exposing the `chat/completions` protocol:
//! OpenAI itself, Ollama's compatibility layer, vLLM, and friends.
//!
//! Supports non-streaming JSON responses and streaming SSE
//! (`data: {json}` lines terminated by `data: [DONE]`).

use crate::wire::{ChatChunk, ChatResponse, ModelList};
use async_trait::async_trait;
use futures::StreamExt;
use oxpilot_core::error::ProviderError;
use oxpilot_core::provider::{CompletionRequest, Provider};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider speaking to a single base URL.
///
/// The base URL includes any path prefix; requests go to
/// `{base_url}/chat/completions` and `{base_url}/models`. The fallback
/// adapter constructs one instance with a `/v1` suffix (the compatible
/// surface) and one without (the native OpenAI endpoint).
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_builder(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }
        builder
    }

    async fn send_checked(
        &self,
        request: &CompletionRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(provider = %self.name, model = %request.model, url = %url, "Sending completion request");

        let response = self
            .request_builder(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, "Endpoint returned error status");
            return Err(ProviderError::Http { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let mut request = request;
        request.stream = false;

        let response = self.send_checked(&request).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("failed to parse response: {e}")))?;

        if let Some(err) = body.error {
            return Err(ProviderError::Api(err.message));
        }

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Protocol("no response from API".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<String, ProviderError>>,
        ProviderError,
    > {
        let mut request = request;
        request.stream = true;

        let response = self.send_checked(&request).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward content deltas in order.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::Network(e.to_string()))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip blank lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    // "[DONE]" terminates the stream
                    if data == "[DONE]" {
                        return;
                    }

                    let chunk: ChatChunk = match serde_json::from_str(data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            let _ = tx
                                .send(Err(ProviderError::Protocol(format!(
                                    "error parsing chunk: {e}"
                                ))))
                                .await;
                            return;
                        }
                    };

                    // An in-band error aborts the stream immediately
                    if let Some(err) = chunk.error {
                        let _ = tx.send(Err(ProviderError::Api(err.message))).await;
                        return;
                    }

                    if let Some(choice) = chunk.choices.first()
                        && let Some(content) = &choice.delta.content
                        && !content.is_empty()
                        && tx.send(Ok(content.clone())).await.is_err()
                    {
                        return; // receiver dropped
                    }
                }
            }
            // Input exhausted without [DONE] — the stream simply ends.
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let mut builder = self.client.get(&url);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, message });
        }

        let body: ModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("failed to parse model list: {e}")))?;

        Ok(body.data.into_iter().map(|m| m.id).collect())
    }
}
