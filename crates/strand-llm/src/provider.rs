//! Provider call contract and error taxonomy.
//!
//! A provider backend implements [`ProviderCall`]: given the conversation
//! history it opens one streaming completion and returns the raw,
//! provider-shaped JSON events. Everything downstream (normalization, retry,
//! automode) is provider-independent.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use strand_core::Message;

use crate::normalizer::ProviderKind;

/// Boxed stream of raw provider events, as parsed JSON.
pub type RawEventStream =
    Pin<Box<dyn Stream<Item = Result<serde_json::Value, ProviderError>> + Send>>;

/// Boxed stream of canonical messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Could not reach the provider (DNS, TCP, TLS, timeout, reset).
    /// The only class the retry wrapper acts on.
    #[error("connection error: {message}")]
    Connection {
        /// Error description.
        message: String,
    },

    /// Authentication failed (expired token, invalid key).
    #[error("auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Provider returned an API error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Call was cancelled.
    #[error("call cancelled")]
    Cancelled,

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Whether this is a connection-class error eligible for retry.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Error category string for logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Auth { .. } => "auth",
            Self::Api { .. } => "api",
            Self::Json(_) => "parse",
            Self::Cancelled => "cancelled",
            Self::Other { .. } => "unknown",
        }
    }
}

/// One streaming completion request against a provider backend.
///
/// Implementors must be `Send + Sync`; the automode loop calls
/// [`perform_call`](ProviderCall::perform_call) once per turn with the
/// history accumulated so far.
#[async_trait]
pub trait ProviderCall: Send + Sync {
    /// Which normalizer family this backend's events belong to.
    fn kind(&self) -> ProviderKind;

    /// Open a streaming completion for the given conversation.
    ///
    /// `chain_of_thought` carries extra reasoning guidance some backends
    /// inject into the prompt; backends that have native thinking ignore it.
    async fn perform_call(
        &self,
        history: &[Message],
        system_prompt: &str,
        chain_of_thought: Option<&str>,
    ) -> Result<RawEventStream, ProviderError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
