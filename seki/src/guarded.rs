//! Guarded access to a model provider.
//!
//! [`GuardedProvider`] wraps any [`Provider`] with an input stage and an
//! output stage. Input guardrails run before the model is invoked, so a
//! rejected request costs no tokens at all. Output guardrails run on the
//! finished generation, and a blocked one can be retried with corrective
//! feedback, replaced by a fallback, surfaced as an error, or merely
//! logged, depending on configuration.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seki::guarded::GuardedProvider;
//! use seki::checks::MaxInputLength;
//! use seki::guardrail::Guardrail;
//!
//! let guarded = GuardedProvider::new(my_provider)
//!     .with_input_guardrail(Guardrail::new("max-input", MaxInputLength::new(4000)))
//!     .with_retry(seki::retry::RetryPolicy::new(2));
//! let generation = guarded.generate(&request).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::{Generation, GenerationRequest, GuardrailContext};
use crate::error::{Error, Result};
use crate::executor::{ExecutionOptions, Executor};
use crate::guardrail::{ExecutionSummary, Guardrail};
use crate::hooks::{GuardHooks, NoopGuardHooks};
use crate::provider::Provider;
use crate::retry::{RetryPolicy, regenerate};
use crate::streaming::GuardedStream;

/// What a blocked run does to the call, after retries and fallback have
/// had their chance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockMode {
    /// Fail the call with [`Error::InputBlocked`] or
    /// [`Error::OutputBlocked`].
    #[default]
    Reject,
    /// Log the block and let the call proceed untouched.
    Warn,
}

/// Produces a replacement generation when everything else is exhausted.
pub type FallbackFn = Arc<dyn Fn(&ExecutionSummary) -> Generation + Send + Sync>;

/// A provider wrapped in guardrails.
///
/// Cloning is cheap; the provider, checks, and hooks are shared.
#[derive(Clone)]
pub struct GuardedProvider {
    provider: Arc<dyn Provider>,
    input_guardrails: Vec<Guardrail>,
    output_guardrails: Vec<Guardrail>,
    options: ExecutionOptions,
    mode: BlockMode,
    retry: Option<RetryPolicy>,
    fallback: Option<FallbackFn>,
    hooks: Arc<dyn GuardHooks>,
}

impl GuardedProvider {
    /// Wrap a provider with no guardrails. Add them with the `with_`
    /// builders.
    #[must_use]
    pub fn new(provider: impl Provider + 'static) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    /// Wrap an already-shared provider.
    #[must_use]
    pub fn from_arc(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            options: ExecutionOptions::default(),
            mode: BlockMode::default(),
            retry: None,
            fallback: None,
            hooks: Arc::new(NoopGuardHooks),
        }
    }

    /// Add one input guardrail.
    #[must_use]
    pub fn with_input_guardrail(mut self, guardrail: Guardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    /// Add several input guardrails.
    #[must_use]
    pub fn with_input_guardrails(mut self, guardrails: impl IntoIterator<Item = Guardrail>) -> Self {
        self.input_guardrails.extend(guardrails);
        self
    }

    /// Add one output guardrail.
    #[must_use]
    pub fn with_output_guardrail(mut self, guardrail: Guardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    /// Add several output guardrails.
    #[must_use]
    pub fn with_output_guardrails(
        mut self,
        guardrails: impl IntoIterator<Item = Guardrail>,
    ) -> Self {
        self.output_guardrails.extend(guardrails);
        self
    }

    /// Set execution options for both stages.
    #[must_use]
    pub const fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set what a block does to the call.
    #[must_use]
    pub const fn with_mode(mut self, mode: BlockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Regenerate blocked outputs under this policy before giving up.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Produce a replacement generation when output stays blocked after
    /// retries.
    #[must_use]
    pub fn with_fallback(
        mut self,
        fallback: impl Fn(&ExecutionSummary) -> Generation + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Observe blocked runs.
    #[must_use]
    pub fn with_hooks(mut self, hooks: impl GuardHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Name of the wrapped provider.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// The execution options both stages run under.
    #[must_use]
    pub const fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Generate with guardrails on both sides of the model call.
    ///
    /// Input guardrails run first; when they block in [`BlockMode::Reject`]
    /// the provider is never invoked. Provider errors propagate untouched.
    /// A blocked output goes through retry, then fallback, then the block
    /// mode, in that order.
    ///
    /// # Errors
    ///
    /// [`Error::InputBlocked`] or [`Error::OutputBlocked`] when a stage
    /// blocks in [`BlockMode::Reject`], or [`Error::Provider`] when the
    /// model call itself fails.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        self.run_input_stage(request).await?;
        let generation = self.provider.generate(request).await?;
        self.run_output_stage(request, generation).await
    }

    /// Stream with guardrails: the input stage runs up front, chunks are
    /// forwarded as they arrive, and output guardrails evaluate the
    /// accumulated text once the stream ends naturally.
    ///
    /// Retry and fallback do not apply to streams; a block at end of
    /// stream resolves by [`BlockMode`] alone.
    ///
    /// # Errors
    ///
    /// [`Error::InputBlocked`] when the input stage blocks in
    /// [`BlockMode::Reject`], or [`Error::Provider`] when the provider
    /// cannot open a stream.
    pub async fn stream(&self, request: &GenerationRequest) -> Result<GuardedStream> {
        self.run_input_stage(request).await?;
        let inner = self.provider.stream(request).await?;
        Ok(GuardedStream::new(
            inner,
            self.output_guardrails.clone(),
            request.clone(),
            self.options,
            self.mode,
            Arc::clone(&self.hooks),
        ))
    }

    async fn run_input_stage(&self, request: &GenerationRequest) -> Result<()> {
        if self.input_guardrails.is_empty() {
            return Ok(());
        }
        let ctx = GuardrailContext::from_request(request.clone());
        let summary = Executor::execute(&self.input_guardrails, &ctx, &self.options).await;
        if !summary.is_blocked() {
            return Ok(());
        }

        self.hooks.input_blocked(&summary).await;
        match self.mode {
            BlockMode::Reject => Err(Error::input_blocked(summary)),
            BlockMode::Warn => {
                warn!(
                    blocked = ?summary.blocked_names(),
                    "Input guardrails tripped; continuing in warn mode"
                );
                Ok(())
            }
        }
    }

    async fn run_output_stage(
        &self,
        request: &GenerationRequest,
        generation: Generation,
    ) -> Result<Generation> {
        if self.output_guardrails.is_empty() {
            return Ok(generation);
        }
        let ctx = GuardrailContext::with_generation(request.clone(), generation.clone());
        let summary = Executor::execute(&self.output_guardrails, &ctx, &self.options).await;
        if !summary.is_blocked() {
            return Ok(generation);
        }

        // One hook call per logical invocation, on the first block.
        self.hooks.output_blocked(&summary).await;

        let (generation, summary) = if let Some(policy) = &self.retry {
            let (generation, summary) = regenerate(
                self.provider.as_ref(),
                &self.output_guardrails,
                &self.options,
                policy,
                request,
                generation,
                summary,
            )
            .await?;
            if !summary.is_blocked() {
                return Ok(generation);
            }
            (generation, summary)
        } else {
            (generation, summary)
        };

        if let Some(fallback) = &self.fallback {
            debug!(
                blocked = ?summary.blocked_names(),
                "Output still blocked; using fallback generation"
            );
            return Ok(fallback(&summary));
        }

        match self.mode {
            BlockMode::Reject => Err(Error::output_blocked(summary)),
            BlockMode::Warn => {
                warn!(
                    blocked = ?summary.blocked_names(),
                    "Output guardrails tripped; returning generation in warn mode"
                );
                Ok(generation)
            }
        }
    }
}

impl fmt::Debug for GuardedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedProvider")
            .field("provider", &self.provider.name())
            .field("input_guardrails", &self.input_guardrails.len())
            .field("output_guardrails", &self.output_guardrails.len())
            .field("options", &self.options)
            .field("mode", &self.mode)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::guardrail::GuardrailOutput;
    use crate::retry::Backoff;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        reply: String,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_owned(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> std::result::Result<Generation, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Generation::from_text(self.reply.clone()))
        }
    }

    struct Scripted {
        replies: Mutex<Vec<Generation>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(Generation::from_text).collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> std::result::Result<Generation, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(ProviderError::internal("scripted", "script exhausted"))
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    struct Failing;

    #[async_trait]
    impl Provider for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> std::result::Result<Generation, ProviderError> {
            Err(ProviderError::network("failing", "connection refused"))
        }
    }

    #[derive(Default)]
    struct CountingHooks {
        input: AtomicUsize,
        output: AtomicUsize,
    }

    #[async_trait]
    impl GuardHooks for Arc<CountingHooks> {
        async fn input_blocked(&self, _summary: &ExecutionSummary) {
            self.input.fetch_add(1, Ordering::SeqCst);
        }

        async fn output_blocked(&self, _summary: &ExecutionSummary) {
            self.output.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn input_blocker() -> Guardrail {
        Guardrail::from_fn("input-blocker", |_| {
            Ok(GuardrailOutput::tripwire("input rejected"))
        })
    }

    fn output_short_blocker() -> Guardrail {
        Guardrail::from_fn("min-length", |ctx| {
            let short = ctx.output_text().is_some_and(|t| t.len() < 10);
            if short {
                Ok(GuardrailOutput::tripwire("too short"))
            } else {
                Ok(GuardrailOutput::pass())
            }
        })
    }

    fn counting_output_guardrail(counter: Arc<AtomicUsize>) -> Guardrail {
        Guardrail::from_fn("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(GuardrailOutput::pass())
        })
    }

    fn request() -> GenerationRequest {
        GenerationRequest::from_prompt("hello there")
    }

    #[tokio::test]
    async fn unguarded_calls_pass_straight_through() {
        let provider = Arc::new(Counting::new("hi"));
        let guarded = GuardedProvider::from_arc(Arc::clone(&provider) as Arc<dyn Provider>);
        let generation = guarded.generate(&request()).await.unwrap();
        assert_eq!(generation.text.as_deref(), Some("hi"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocked_input_never_reaches_the_provider() {
        let provider = Arc::new(Counting::new("hi"));
        let hooks = Arc::new(CountingHooks::default());
        let guarded = GuardedProvider::from_arc(Arc::clone(&provider) as Arc<dyn Provider>)
            .with_input_guardrail(input_blocker())
            .with_hooks(Arc::clone(&hooks));

        let err = guarded.generate(&request()).await.unwrap_err();
        assert!(matches!(err, Error::InputBlocked { .. }));
        assert!(err.to_string().contains("input rejected"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.input.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_prompt_is_refused_before_any_model_cost() {
        let provider = Arc::new(Counting::new("hi"));
        let guarded = GuardedProvider::from_arc(Arc::clone(&provider) as Arc<dyn Provider>)
            .with_input_guardrail(Guardrail::new(
                "max-input",
                crate::checks::MaxInputLength::new(100),
            ));

        let err = guarded
            .generate(&GenerationRequest::from_prompt("x".repeat(150)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("100"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn warn_mode_lets_blocked_input_proceed() {
        let provider = Arc::new(Counting::new("hi"));
        let hooks = Arc::new(CountingHooks::default());
        let guarded = GuardedProvider::from_arc(Arc::clone(&provider) as Arc<dyn Provider>)
            .with_input_guardrail(input_blocker())
            .with_mode(BlockMode::Warn)
            .with_hooks(Arc::clone(&hooks));

        let generation = guarded.generate(&request()).await.unwrap();
        assert_eq!(generation.text.as_deref(), Some("hi"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        // The hook still observes the block.
        assert_eq!(hooks.input.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocked_output_rejects_without_retry() {
        let hooks = Arc::new(CountingHooks::default());
        let guarded = GuardedProvider::new(Counting::new("hi"))
            .with_output_guardrail(output_short_blocker())
            .with_hooks(Arc::clone(&hooks));

        let err = guarded.generate(&request()).await.unwrap_err();
        assert!(matches!(err, Error::OutputBlocked { .. }));
        assert_eq!(err.summary().map(ExecutionSummary::len), Some(1));
        assert_eq!(hooks.output.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn warn_mode_returns_blocked_generation_unchanged() {
        let guarded = GuardedProvider::new(Counting::new("hi"))
            .with_output_guardrail(output_short_blocker())
            .with_mode(BlockMode::Warn);

        let generation = guarded.generate(&request()).await.unwrap();
        assert_eq!(generation.text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn retry_recovers_a_blocked_output() {
        let provider = Arc::new(Scripted::new(vec!["hi", "a much longer reply"]));
        let hooks = Arc::new(CountingHooks::default());
        let guarded = GuardedProvider::from_arc(Arc::clone(&provider) as Arc<dyn Provider>)
            .with_output_guardrail(output_short_blocker())
            .with_retry(RetryPolicy::new(2).with_backoff(Backoff::none()))
            .with_hooks(Arc::clone(&hooks));

        let generation = guarded.generate(&request()).await.unwrap();
        assert_eq!(generation.text.as_deref(), Some("a much longer reply"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        // One logical invocation, one hook call, despite the retry.
        assert_eq!(hooks.output.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_reject_with_the_last_summary() {
        let provider = Arc::new(Scripted::new(vec!["a", "b", "c"]));
        let guarded = GuardedProvider::from_arc(Arc::clone(&provider) as Arc<dyn Provider>)
            .with_output_guardrail(output_short_blocker())
            .with_retry(RetryPolicy::new(2).with_backoff(Backoff::none()));

        let err = guarded.generate(&request()).await.unwrap_err();
        assert!(matches!(err, Error::OutputBlocked { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fallback_replaces_a_hopelessly_blocked_output() {
        let guarded = GuardedProvider::new(Counting::new("hi"))
            .with_output_guardrail(output_short_blocker())
            .with_fallback(|summary| {
                Generation::from_text(format!(
                    "I cannot answer that ({} checks failed).",
                    summary.blocked().len()
                ))
            });

        let generation = guarded.generate(&request()).await.unwrap();
        assert_eq!(
            generation.text.as_deref(),
            Some("I cannot answer that (1 checks failed).")
        );
    }

    #[tokio::test]
    async fn provider_errors_skip_output_guardrails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guarded = GuardedProvider::new(Failing)
            .with_output_guardrail(counting_output_guardrail(Arc::clone(&counter)));

        let err = guarded.generate(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
