//! Unified error type for the wifassist workspace.

use std::fmt;
use thiserror::Error;

/// Which leg of the login exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStep {
    /// Authorization code → identity-provider token.
    ProviderToken,
    /// Identity-provider token → federated cloud credential (STS).
    Federation,
}

impl fmt::Display for ExchangeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderToken => write!(f, "provider token"),
            Self::Federation => write!(f, "federation"),
        }
    }
}

/// Enumerates all error kinds that can occur across wifassist crates.
#[derive(Debug, Error)]
pub enum WifError {
    /// A required identifier is missing or malformed. Raised before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// A step of the token or federation exchange failed.
    #[error("{step} exchange failed: {message}")]
    Exchange { step: ExchangeStep, message: String },

    /// The local redirect listener could not bind, accept, or finish in time.
    #[error("redirect listener error: {0}")]
    Listener(String),

    /// The authorization callback did not carry what the login needs.
    #[error("authentication error: {0}")]
    Auth(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// The assistant service returned a non-success status.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// A frame of the assistant stream could not be decoded.
    #[error("stream error: {0}")]
    Stream(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for WifError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl WifError {
    /// Shorthand for an [`WifError::Exchange`] at the given step.
    pub fn exchange(step: ExchangeStep, message: impl Into<String>) -> Self {
        Self::Exchange {
            step,
            message: message.into(),
        }
    }

    /// Returns `true` if the error is likely transient and worth retrying.
    ///
    /// Nothing in this workspace retries on its own; this is for callers that
    /// want to apply their own policy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            Self::Http(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, WifError>;
