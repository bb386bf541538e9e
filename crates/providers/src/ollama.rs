//! Ollama-native provider implementation.
//!
//! Speaks Ollama's own API: `/api/chat` for multi-turn conversations and
//! `/api/generate` for single-turn prompts. The endpoint is selected once per
//! request, never per chunk. Streaming responses are newline-delimited JSON
//! objects carrying `{response, done, error?}`.

use crate::wire::{OllamaChatResponse, OllamaChunk, OllamaRequest, OllamaTags};
use async_trait::async_trait;
use futures::StreamExt;
use oxpilot_core::error::ProviderError;
use oxpilot_core::provider::{CompletionRequest, Provider};
use tracing::{debug, warn};

/// Which native endpoint a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Chat,
    Generate,
}

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Chat for multi-turn histories, generate for a single message.
    fn select_endpoint(request: &CompletionRequest) -> Endpoint {
        if request.messages.len() > 1 {
            Endpoint::Chat
        } else {
            Endpoint::Generate
        }
    }

    fn build_body(request: &CompletionRequest, endpoint: Endpoint, stream: bool) -> OllamaRequest {
        match endpoint {
            Endpoint::Chat => OllamaRequest {
                model: request.model.clone(),
                messages: Some(request.messages.clone()),
                prompt: None,
                stream,
                temperature: request.temperature,
                max_tokens: None,
            },
            Endpoint::Generate => OllamaRequest {
                model: request.model.clone(),
                messages: None,
                // The last message's content becomes the prompt
                prompt: Some(
                    request
                        .messages
                        .last()
                        .map(|m| m.content.clone())
                        .unwrap_or_default(),
                ),
                stream,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            },
        }
    }

    async fn send_checked(
        &self,
        endpoint: Endpoint,
        body: &OllamaRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let path = match endpoint {
            Endpoint::Chat => "/api/chat",
            Endpoint::Generate => "/api/generate",
        };
        let url = format!("{}{}", self.base_url, path);

        debug!(model = %body.model, url = %url, "Sending Ollama-native request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            warn!(status, "Ollama endpoint returned error status");
            return Err(ProviderError::Http { status, message });
        }

        Ok(response)
    }
}

/// Parse a non-streaming `/api/generate` body.
///
/// Older servers answer with a single JSON object; others return the
/// NDJSON stream even when `stream` is false. Both are accepted: the
/// `response` fields are concatenated and invalid lines are skipped.
fn parse_generate_body(body: &str) -> Result<String, ProviderError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Protocol("empty response from Ollama".into()));
    }
    if !trimmed.starts_with('{') {
        return Err(ProviderError::Protocol("invalid response format".into()));
    }

    if !trimmed.contains('\n') {
        let chunk: OllamaChunk = serde_json::from_str(trimmed)
            .map_err(|e| ProviderError::Protocol(format!("failed to parse response: {e}")))?;
        if let Some(err) = chunk.error {
            return Err(ProviderError::Api(err));
        }
        return Ok(chunk.response);
    }

    let mut full = String::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<OllamaChunk>(line) {
            Ok(chunk) => {
                if let Some(err) = chunk.error {
                    return Err(ProviderError::Api(err));
                }
                full.push_str(&chunk.response);
            }
            Err(e) => {
                warn!(error = %e, "Skipping invalid JSON line in generate response");
            }
        }
    }
    Ok(full)
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let endpoint = Self::select_endpoint(&request);
        let body = Self::build_body(&request, endpoint, false);
        let response = self.send_checked(endpoint, &body).await?;

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        match endpoint {
            Endpoint::Chat => {
                let parsed: OllamaChatResponse = serde_json::from_str(&text).map_err(|e| {
                    ProviderError::Protocol(format!("failed to parse chat response: {e}"))
                })?;
                if let Some(err) = parsed.error {
                    return Err(ProviderError::Api(err));
                }
                Ok(parsed.message.content)
            }
            Endpoint::Generate => parse_generate_body(&text),
        }
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<String, ProviderError>>,
        ProviderError,
    > {
        // Endpoint choice happens here, once per request
        let endpoint = Self::select_endpoint(&request);
        let body = Self::build_body(&request, endpoint, true);
        let response = self.send_checked(endpoint, &body).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

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

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    let chunk: OllamaChunk = match serde_json::from_str(&line) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            let _ = tx
                                .send(Err(ProviderError::Protocol(format!(
                                    "error parsing response: {e}"
                                ))))
                                .await;
                            return;
                        }
                    };

                    if let Some(err) = chunk.error {
                        let _ = tx.send(Err(ProviderError::Api(err))).await;
                        return;
                    }

                    if !chunk.response.is_empty()
                        && tx.send(Ok(chunk.response)).await.is_err()
                    {
                        return; // receiver dropped
                    }

                    if chunk.done {
                        return;
                    }
                }
            }
            // Input exhausted — the stream ends.
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, message });
        }

        let body: OllamaTags = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("failed to parse tags: {e}")))?;

        Ok(body.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxpilot_core::Message;

    fn single_turn() -> CompletionRequest {
        CompletionRequest::new("llama3.2:latest", vec![Message::user("hello")])
    }

    fn multi_turn() -> CompletionRequest {
        CompletionRequest::new(
            "llama3.2:latest",
            vec![
                Message::system("be terse"),
                Message::user("hi"),
                Message::assistant("hey"),
                Message::user("explain lifetimes"),
            ],
        )
    }

    #[test]
    fn multi_turn_selects_chat() {
        assert_eq!(OllamaProvider::select_endpoint(&multi_turn()), Endpoint::Chat);
    }

    #[test]
    fn single_turn_selects_generate() {
        assert_eq!(
            OllamaProvider::select_endpoint(&single_turn()),
            Endpoint::Generate
        );
    }

    #[test]
    fn generate_body_uses_last_message_as_prompt() {
        let body = OllamaProvider::build_body(&single_turn(), Endpoint::Generate, false);
        assert_eq!(body.prompt.as_deref(), Some("hello"));
        assert!(body.messages.is_none());
    }

    #[test]
    fn chat_body_carries_full_history() {
        let body = OllamaProvider::build_body(&multi_turn(), Endpoint::Chat, true);
        assert_eq!(body.messages.as_ref().unwrap().len(), 4);
        assert!(body.prompt.is_none());
        assert!(body.stream);
    }

    #[test]
    fn parse_single_object_generate_response() {
        let body = r#"{"model":"llama3.2:latest","response":"The answer is 4.","done":true}"#;
        assert_eq!(parse_generate_body(body).unwrap(), "The answer is 4.");
    }

    #[test]
    fn parse_ndjson_generate_response() {
        let body = "{\"response\":\"The \",\"done\":false}\n{\"response\":\"answer\",\"done\":false}\n{\"response\":\".\",\"done\":true}\n";
        assert_eq!(parse_generate_body(body).unwrap(), "The answer.");
    }

    #[test]
    fn parse_generate_skips_invalid_lines() {
        let body = "{\"response\":\"ok\",\"done\":false}\nnot json\n{\"response\":\"!\",\"done\":true}\n";
        assert_eq!(parse_generate_body(body).unwrap(), "ok!");
    }

    #[test]
    fn parse_generate_surfaces_api_error() {
        let body = r#"{"response":"","done":true,"error":"model not loaded"}"#;
        match parse_generate_body(body) {
            Err(ProviderError::Api(msg)) => assert_eq!(msg, "model not loaded"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn parse_generate_rejects_non_json() {
        assert!(matches!(
            parse_generate_body("<html>404</html>"),
            Err(ProviderError::Protocol(_))
        ));
        assert!(matches!(
            parse_generate_body("   "),
            Err(ProviderError::Protocol(_))
        ));
    }
}
