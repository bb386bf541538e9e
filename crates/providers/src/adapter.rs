//! Provider fallback adapter.
//!
//! Every request first goes to the OpenAI-compatible surface
//! (`{base_url}/v1/chat/completions`). When that attempt fails at the
//! transport level, or the endpoint answers 404 or any status >= 400, the
//! adapter makes exactly one call to the provider-native endpoint selected by
//! the configured provider kind. In-band API errors and mid-stream protocol
//! errors are final — they never trigger the fallback.

use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;
use async_trait::async_trait;
use oxpilot_core::error::ProviderError;
use oxpilot_core::provider::{CompletionRequest, Provider};
use oxpilot_config::{ProviderConfig, ProviderKind};
use std::sync::Arc;
use tracing::{info, warn};

/// The provider-native surface behind the compatible one.
enum NativeSurface {
    /// `POST {base_url}/chat/completions` with bearer auth — no `/v1` prefix.
    OpenAi(OpenAiCompatProvider),
    /// `/api/chat` or `/api/generate`, NDJSON streaming.
    Ollama(OllamaProvider),
}

impl NativeSurface {
    fn as_provider(&self) -> &dyn Provider {
        match self {
            NativeSurface::OpenAi(p) => p,
            NativeSurface::Ollama(p) => p,
        }
    }
}

/// A provider that tries the OpenAI-compatible surface first and falls back
/// to the provider-native API.
pub struct FallbackAdapter {
    name: String,
    compat: OpenAiCompatProvider,
    native: NativeSurface,
}

impl FallbackAdapter {
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.into();

        let compat = OpenAiCompatProvider::new(
            name.clone(),
            format!("{base_url}/v1"),
            api_key.clone(),
        );

        let native = match kind {
            ProviderKind::OpenAi => {
                NativeSurface::OpenAi(OpenAiCompatProvider::new(name.clone(), base_url, api_key))
            }
            ProviderKind::Ollama => NativeSurface::Ollama(OllamaProvider::new(base_url)),
        };

        Self {
            name,
            compat,
            native,
        }
    }

    /// Build the adapter for a configured provider.
    pub fn from_config(name: impl Into<String>, config: &ProviderConfig) -> Self {
        Self::new(
            name,
            config.kind,
            &config.base_url,
            config.api_key.clone().unwrap_or_default(),
        )
    }

    /// Build the adapter for an [`oxpilot_config::AppConfig`]'s default provider.
    pub fn from_app_config(
        config: &oxpilot_config::AppConfig,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let (name, provider_config) = config
            .default_provider()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
        Ok(Arc::new(Self::from_config(name, provider_config)))
    }

    /// Whether a compatible-surface failure routes to the native endpoint.
    ///
    /// Transport failures and HTTP error statuses do; in-band API errors and
    /// protocol errors are final.
    fn should_fall_back(err: &ProviderError) -> bool {
        matches!(
            err,
            ProviderError::Network(_) | ProviderError::Http { .. } | ProviderError::Timeout(_)
        )
    }
}

#[async_trait]
impl Provider for FallbackAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        match self.compat.complete(request.clone()).await {
            Ok(text) => Ok(text),
            Err(e) if Self::should_fall_back(&e) => {
                warn!(provider = %self.name, error = %e, "Compatible surface failed, falling back to native endpoint");
                info!(provider = %self.name, "Trying provider-native endpoint");
                self.native.as_provider().complete(request).await
            }
            Err(e) => Err(e),
        }
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<String, ProviderError>>,
        ProviderError,
    > {
        match self.compat.stream(request.clone()).await {
            Ok(rx) => Ok(rx),
            Err(e) if Self::should_fall_back(&e) => {
                warn!(provider = %self.name, error = %e, "Compatible surface failed, falling back to native endpoint (streaming)");
                self.native.as_provider().stream(request).await
            }
            Err(e) => Err(e),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        match self.compat.list_models().await {
            Ok(models) => Ok(models),
            Err(e) if Self::should_fall_back(&e) => self.native.as_provider().list_models().await,
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxpilot_core::Message;
    use std::sync::Mutex;

    /// A mock provider with a scripted outcome and a call counter.
    struct ScriptedProvider {
        name: String,
        outcome: Result<String, ProviderError>,
        calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn ok(name: &str, text: &str) -> Self {
            Self {
                name: name.into(),
                outcome: Ok(text.into()),
                calls: Mutex::new(0),
            }
        }

        fn err(name: &str, error: ProviderError) -> Self {
            Self {
                name: name.into(),
                outcome: Err(error),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.outcome.clone()
        }
    }

    /// A fallback pair wired from mock surfaces, mirroring the adapter's
    /// cascade logic so it can be exercised without a network.
    struct MockCascade {
        compat: ScriptedProvider,
        native: ScriptedProvider,
    }

    impl MockCascade {
        async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
            match self.compat.complete(request.clone()).await {
                Ok(text) => Ok(text),
                Err(e) if FallbackAdapter::should_fall_back(&e) => {
                    self.native.complete(request).await
                }
                Err(e) => Err(e),
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("test-model", vec![Message::user("hello")])
    }

    #[tokio::test]
    async fn compat_success_skips_native() {
        let cascade = MockCascade {
            compat: ScriptedProvider::ok("compat", "from compat"),
            native: ScriptedProvider::ok("native", "from native"),
        };

        let text = cascade.complete(request()).await.unwrap();
        assert_eq!(text, "from compat");
        assert_eq!(cascade.compat.calls(), 1);
        assert_eq!(cascade.native.calls(), 0);
    }

    #[tokio::test]
    async fn http_404_triggers_exactly_one_native_call() {
        let cascade = MockCascade {
            compat: ScriptedProvider::err(
                "compat",
                ProviderError::Http {
                    status: 404,
                    message: "not found".into(),
                },
            ),
            native: ScriptedProvider::ok("native", "from native"),
        };

        let text = cascade.complete(request()).await.unwrap();
        assert_eq!(text, "from native");
        assert_eq!(cascade.compat.calls(), 1);
        assert_eq!(cascade.native.calls(), 1);
    }

    #[tokio::test]
    async fn transport_error_triggers_fallback() {
        let cascade = MockCascade {
            compat: ScriptedProvider::err(
                "compat",
                ProviderError::Network("connection refused".into()),
            ),
            native: ScriptedProvider::ok("native", "recovered"),
        };

        assert_eq!(cascade.complete(request()).await.unwrap(), "recovered");
        assert_eq!(cascade.native.calls(), 1);
    }

    #[tokio::test]
    async fn in_band_api_error_is_final() {
        let cascade = MockCascade {
            compat: ScriptedProvider::err("compat", ProviderError::Api("overloaded".into())),
            native: ScriptedProvider::ok("native", "unused"),
        };

        let err = cascade.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));
        assert_eq!(cascade.native.calls(), 0);
    }

    #[tokio::test]
    async fn both_surfaces_failing_returns_native_error() {
        let cascade = MockCascade {
            compat: ScriptedProvider::err(
                "compat",
                ProviderError::Http {
                    status: 500,
                    message: "server error".into(),
                },
            ),
            native: ScriptedProvider::err("native", ProviderError::Network("down".into())),
        };

        let err = cascade.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
        assert_eq!(cascade.compat.calls(), 1);
        assert_eq!(cascade.native.calls(), 1);
    }

    #[test]
    fn fallback_classification() {
        assert!(FallbackAdapter::should_fall_back(&ProviderError::Network(
            "x".into()
        )));
        assert!(FallbackAdapter::should_fall_back(&ProviderError::Http {
            status: 404,
            message: String::new(),
        }));
        assert!(FallbackAdapter::should_fall_back(&ProviderError::Http {
            status: 503,
            message: String::new(),
        }));
        assert!(!FallbackAdapter::should_fall_back(&ProviderError::Api(
            "x".into()
        )));
        assert!(!FallbackAdapter::should_fall_back(
            &ProviderError::Protocol("x".into())
        ));
    }

    #[test]
    fn adapter_construction_by_kind() {
        let openai = FallbackAdapter::new(
            "openai",
            ProviderKind::OpenAi,
            "https://api.openai.com",
            "sk-test",
        );
        assert_eq!(openai.name(), "openai");
        assert_eq!(openai.compat.base_url(), "https://api.openai.com/v1");
        assert!(matches!(openai.native, NativeSurface::OpenAi(_)));

        let ollama = FallbackAdapter::new(
            "ollama",
            ProviderKind::Ollama,
            "http://localhost:11434/",
            "",
        );
        assert_eq!(ollama.compat.base_url(), "http://localhost:11434/v1");
        assert!(matches!(ollama.native, NativeSurface::Ollama(_)));
    }
}
