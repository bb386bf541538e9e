//! Wire types for the chat-completion endpoints.
//!
//! Covers the OpenAI-compatible surface (JSON responses and SSE chunk
//! payloads) and the Ollama-native chat/generate endpoints (NDJSON).

use oxpilot_core::Message;
use serde::{Deserialize, Serialize};

// --- OpenAI-compatible responses ---

/// An in-band error object carried inside an otherwise well-formed body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// A single SSE `data: {...}` payload from a streaming response.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelInfo {
    pub id: String,
}

// --- Ollama-native ---

/// Request body for both `/api/chat` (messages) and `/api/generate` (prompt).
#[derive(Debug, Serialize)]
pub(crate) struct OllamaRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One NDJSON object from a streamed (or generate) response.
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Non-streaming `/api/chat` response.
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaChatResponse {
    #[serde(default)]
    pub message: OllamaChatMessage,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OllamaChatMessage {
    #[serde(default)]
    pub content: String,
}

/// `/api/tags` response (model listing).
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaTags {
    #[serde(default)]
    pub models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OllamaTag {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_response() {
        let body = r#"{
            "id": "chatcmpl-1", "object": "chat.completion", "created": 1700000000,
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hello!"));
        assert!(parsed.error.is_none());
    }

    #[test]
    fn parse_chat_response_error() {
        let body = r#"{"choices": [], "error": {"message": "model overloaded", "type": "server_error", "code": "503"}}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.unwrap().message, "model overloaded");
    }

    #[test]
    fn parse_stream_chunk_delta() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let parsed: ChatChunk = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hel"));
    }

    #[test]
    fn parse_stream_chunk_empty_delta() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let parsed: ChatChunk = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
    }

    #[test]
    fn ollama_chat_request_omits_prompt() {
        let req = OllamaRequest {
            model: "llama3.2:latest".into(),
            messages: Some(vec![Message::user("hi")]),
            prompt: None,
            stream: true,
            temperature: Some(0.7),
            max_tokens: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("messages"));
        assert!(!json.contains("prompt"));
    }

    #[test]
    fn ollama_generate_request_omits_messages() {
        let req = OllamaRequest {
            model: "llama3.2:latest".into(),
            messages: None,
            prompt: Some("explain this".into()),
            stream: false,
            temperature: Some(0.7),
            max_tokens: Some(2048),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("prompt"));
        assert!(!json.contains("messages"));
        assert!(json.contains("max_tokens"));
    }

    #[test]
    fn parse_ollama_chunk() {
        let data = r#"{"model":"llama3.2:latest","response":"Hi","done":false}"#;
        let parsed: OllamaChunk = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.response, "Hi");
        assert!(!parsed.done);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn parse_ollama_tags() {
        let data = r#"{"models":[{"name":"llama3.2:latest","size":1000},{"name":"codellama:7b"}]}"#;
        let parsed: OllamaTags = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.models.len(), 2);
        assert_eq!(parsed.models[0].name, "llama3.2:latest");
    }
}
