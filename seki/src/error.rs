//! Error types.
//!
//! [`Error`] covers everything the orchestration layer can surface;
//! [`ProviderError`] describes failures inside a model provider. Blocked
//! variants carry the full [`ExecutionSummary`] so callers can inspect
//! every guardrail verdict, not just the one that tripped.

use thiserror::Error;

use crate::guardrail::ExecutionSummary;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An input guardrail tripped and the policy is to throw. The model
    /// was never invoked.
    #[error("input blocked by guardrail '{name}': {message}")]
    InputBlocked {
        /// Name of the first guardrail that tripped.
        name: String,
        /// Message reported by that guardrail.
        message: String,
        /// Every result from the blocking run.
        summary: ExecutionSummary,
    },

    /// An output guardrail tripped and the policy is to throw.
    #[error("output blocked by guardrail '{name}': {message}")]
    OutputBlocked {
        /// Name of the first guardrail that tripped.
        name: String,
        /// Message reported by that guardrail.
        message: String,
        /// Every result from the blocking run.
        summary: ExecutionSummary,
    },

    /// The model provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An agent run exceeded its step budget.
    #[error("agent exceeded maximum steps ({max_steps})")]
    MaxSteps {
        /// The step budget that was exhausted.
        max_steps: usize,
    },

    /// An evaluation dataset could not be read or parsed.
    #[error("invalid dataset: {0}")]
    Dataset(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::InputBlocked`] from a blocking run.
    #[must_use]
    pub fn input_blocked(summary: ExecutionSummary) -> Self {
        let (name, message) = blocked_identity(&summary);
        Self::InputBlocked {
            name,
            message,
            summary,
        }
    }

    /// Build an [`Error::OutputBlocked`] from a blocking run.
    #[must_use]
    pub fn output_blocked(summary: ExecutionSummary) -> Self {
        let (name, message) = blocked_identity(&summary);
        Self::OutputBlocked {
            name,
            message,
            summary,
        }
    }

    /// Build an [`Error::MaxSteps`].
    #[must_use]
    pub const fn max_steps(max_steps: usize) -> Self {
        Self::MaxSteps { max_steps }
    }

    /// Build an [`Error::Dataset`].
    #[must_use]
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset(message.into())
    }

    /// Whether this error is a guardrail block (input or output).
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::InputBlocked { .. } | Self::OutputBlocked { .. })
    }

    /// The execution summary attached to a blocked error, if any.
    #[must_use]
    pub const fn summary(&self) -> Option<&ExecutionSummary> {
        match self {
            Self::InputBlocked { summary, .. } | Self::OutputBlocked { summary, .. } => {
                Some(summary)
            }
            _ => None,
        }
    }
}

fn blocked_identity(summary: &ExecutionSummary) -> (String, String) {
    summary.first_blocked().map_or_else(
        || ("unknown".to_owned(), "guardrail tripwire triggered".to_owned()),
        |result| (result.guardrail_name.clone(), result.message_or_default().to_owned()),
    )
}

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderErrorKind {
    /// Transport failed or the endpoint was unreachable.
    Network,
    /// The provider throttled the call.
    RateLimited,
    /// The provider rejected the request as malformed.
    InvalidRequest,
    /// The provider does not support the requested capability.
    NotSupported,
    /// The provider failed internally.
    Internal,
}

/// An error from a model provider.
#[derive(Debug, Clone, Error)]
#[error("[{provider}] {message}")]
pub struct ProviderError {
    /// What went wrong, broadly.
    pub kind: ProviderErrorKind,
    /// Which provider failed.
    pub provider: String,
    /// Provider-reported detail.
    pub message: String,
}

impl ProviderError {
    /// Create a provider error.
    #[must_use]
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a [`ProviderErrorKind::Network`] error.
    #[must_use]
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, provider, message)
    }

    /// Create a [`ProviderErrorKind::RateLimited`] error.
    #[must_use]
    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, provider, message)
    }

    /// Create a [`ProviderErrorKind::InvalidRequest`] error.
    #[must_use]
    pub fn invalid_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, provider, message)
    }

    /// Create a [`ProviderErrorKind::NotSupported`] error.
    #[must_use]
    pub fn not_supported(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotSupported, provider, message)
    }

    /// Create a [`ProviderErrorKind::Internal`] error.
    #[must_use]
    pub fn internal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Internal, provider, message)
    }
}
