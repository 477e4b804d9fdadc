//! The model provider seam.
//!
//! Everything upstream of the guardrails is abstracted behind
//! [`Provider`]: one call to produce a whole generation, one optional
//! call to stream it chunk by chunk. Wrappers in this crate accept any
//! implementation.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::context::{Generation, GenerationRequest};
use crate::error::ProviderError;

/// A stream of text deltas from a provider.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// A model backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, used in error reports and logs.
    fn name(&self) -> &str;

    /// Produce a complete generation for the request.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the model call fails.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError>;

    /// Stream the generation as text deltas. Providers that cannot stream
    /// keep this default.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderErrorKind::NotSupported`](crate::error::ProviderErrorKind::NotSupported)
    /// by default, or whatever the provider reports when opening the
    /// stream fails.
    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream, ProviderError> {
        let _ = request;
        Err(ProviderError::not_supported(
            self.name(),
            "streaming is not supported by this provider",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<Generation, ProviderError> {
            Ok(Generation::from_text(request.input_text()))
        }
    }

    #[tokio::test]
    async fn default_stream_reports_not_supported() {
        let err = Echo
            .stream(&GenerationRequest::from_prompt("hi"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ProviderErrorKind::NotSupported);
        assert_eq!(err.provider, "echo");
    }

    #[tokio::test]
    async fn generate_round_trips_text() {
        let generation = Echo
            .generate(&GenerationRequest::from_prompt("hi"))
            .await
            .unwrap();
        assert_eq!(generation.text.as_deref(), Some("hi"));
    }
}
