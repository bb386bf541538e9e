//! Error types for the oxpilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all oxpilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Decision engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Change tracker errors ---
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transport-level failure (connection refused, DNS, TLS, read error).
    /// Triggers the provider-native fallback when raised by the compatible surface.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a failing HTTP status.
    /// A 404 (or any >= 400) from the OpenAI-compatible surface triggers fallback.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// An in-band error object returned by the backend. Never retried.
    #[error("API error: {0}")]
    Api(String),

    /// A malformed stream payload. Aborts the stream; text accumulated so far
    /// has already been delivered to the caller.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// A decision is missing a required field. Raised before any phase handler
    /// runs, so no partial side effects are possible.
    #[error("Invalid decision: {0}")]
    Validation(String),

    /// A backup could not be taken before a write. The modification phase is
    /// aborted and already-applied changes are rolled back before this
    /// propagates.
    #[error("Backup failed for {path}: {reason}")]
    Backup { path: String, reason: String },

    #[error("Phase '{phase}' failed: {reason}")]
    Phase { phase: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Failed to back up {path}: {reason}")]
    Backup { path: String, reason: String },

    #[error("Failed to restore {path}: {reason}")]
    Restore { path: String, reason: String },

    #[error("Backup storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::Http {
            status: 404,
            message: "model not found".into(),
        });
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn engine_error_displays_correctly() {
        let err = Error::Engine(EngineError::Validation("action is required".into()));
        assert!(err.to_string().contains("action is required"));
    }

    #[test]
    fn tracker_error_displays_correctly() {
        let err = Error::Tracker(TrackerError::Backup {
            path: "src/main.rs".into(),
            reason: "permission denied".into(),
        });
        assert!(err.to_string().contains("src/main.rs"));
        assert!(err.to_string().contains("permission denied"));
    }
}
