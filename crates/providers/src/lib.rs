//! LLM provider adapters for oxpilot.
//!
//! All providers implement the `oxpilot_core::Provider` trait. The
//! [`FallbackAdapter`] is the entry point: it always tries the
//! OpenAI-compatible surface first and falls back to the provider-native
//! endpoint (OpenAI or Ollama) when the surface is unavailable.

pub mod adapter;
pub mod client;
pub mod ollama;
pub mod openai_compat;
mod wire;

pub use adapter::FallbackAdapter;
pub use client::LlmClient;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
