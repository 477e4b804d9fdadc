//! Corrective regeneration for blocked outputs.
//!
//! When output guardrails trip, the caller can ask the model to try again
//! instead of failing outright. Each retry waits out a [`Backoff`] delay,
//! rebuilds the request through a [`RetryFeedback`] (by default appending
//! a corrective user message listing what tripped), and re-runs the
//! output guardrails on the fresh generation. The loop stops early on the
//! first clean generation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::context::{Generation, GenerationRequest, GuardrailContext, Message};
use crate::error::Result;
use crate::executor::{ExecutionOptions, Executor};
use crate::guardrail::{ExecutionSummary, Guardrail};
use crate::provider::Provider;

/// Delay schedule between regeneration attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Multiplier applied per subsequent attempt.
    pub factor: f64,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Whether to add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(500), 2.0, Duration::from_secs(10))
    }
}

impl Backoff {
    /// The same delay before every attempt.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            factor: 1.0,
            max: delay,
            jitter: false,
        }
    }

    /// Exponentially growing delays, capped at `max`.
    #[must_use]
    pub const fn exponential(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            jitter: false,
        }
    }

    /// No delay at all. Useful in tests and latency-critical paths.
    #[must_use]
    pub const fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the given attempt (1-based).
    #[must_use]
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let base = self.initial.as_secs_f64() * self.factor.powi(exponent as i32);
        let capped = base.min(self.max.as_secs_f64()).max(0.0);
        let secs = if self.jitter {
            capped + capped * 0.25 * fastrand::f64()
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }
}

/// Rebuilds a request after a blocked generation.
///
/// Implementations receive the blocking summary and the request the
/// failed generation came from, and return the request to send next.
pub trait RetryFeedback: Send + Sync {
    /// Build the next request.
    fn rebuild(&self, summary: &ExecutionSummary, request: &GenerationRequest)
    -> GenerationRequest;
}

/// Adapter turning a closure into a [`RetryFeedback`].
struct FnFeedback<F>(F);

impl<F> RetryFeedback for FnFeedback<F>
where
    F: Fn(&ExecutionSummary, &GenerationRequest) -> GenerationRequest + Send + Sync,
{
    fn rebuild(
        &self,
        summary: &ExecutionSummary,
        request: &GenerationRequest,
    ) -> GenerationRequest {
        (self.0)(summary, request)
    }
}

/// Default feedback: tell the model what tripped and ask it to revise.
///
/// Appends a user message listing every triggered guardrail's message and
/// suggestion. Optionally widens the output-token budget, for the common
/// case where a minimum-length check tripped because the budget was too
/// tight.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorrectiveFeedback {
    /// Multiply `max_output_tokens` by this factor on every retry.
    pub widen_budget: Option<f64>,
}

impl CorrectiveFeedback {
    /// Widen the output-token budget by `factor` on each retry.
    #[must_use]
    pub const fn with_widen_budget(mut self, factor: f64) -> Self {
        self.widen_budget = Some(factor);
        self
    }
}

impl RetryFeedback for CorrectiveFeedback {
    fn rebuild(
        &self,
        summary: &ExecutionSummary,
        request: &GenerationRequest,
    ) -> GenerationRequest {
        let mut lines =
            vec!["The previous response was rejected by the following checks:".to_owned()];
        for result in summary.blocked() {
            let mut line = format!(
                "- [{}] {}",
                result.guardrail_name,
                result.message_or_default()
            );
            if let Some(suggestion) = &result.suggestion {
                line.push_str(&format!(" (suggestion: {suggestion})"));
            }
            lines.push(line);
        }
        lines.push("Please revise the response to satisfy every check.".to_owned());

        let mut next = request.clone();
        next.push_message(Message::user(lines.join("\n")));
        if let Some(factor) = self.widen_budget
            && let Some(budget) = next.max_output_tokens
        {
            next.max_output_tokens = Some(widen(budget, factor));
        }
        next
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn widen(budget: u32, factor: f64) -> u32 {
    let widened = (f64::from(budget) * factor).ceil();
    if widened >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        widened.max(0.0) as u32
    }
}

/// How many times to regenerate, how long to wait, and how to rephrase.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
    feedback: Arc<dyn RetryFeedback>,
}

impl RetryPolicy {
    /// Retry up to `max_retries` times with the default backoff and
    /// [`CorrectiveFeedback`].
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::default(),
            feedback: Arc::new(CorrectiveFeedback::default()),
        }
    }

    /// Replace the delay schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the feedback strategy.
    #[must_use]
    pub fn with_feedback(mut self, feedback: impl RetryFeedback + 'static) -> Self {
        self.feedback = Arc::new(feedback);
        self
    }

    /// Replace the feedback strategy with a closure.
    #[must_use]
    pub fn with_feedback_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExecutionSummary, &GenerationRequest) -> GenerationRequest
            + Send
            + Sync
            + 'static,
    {
        self.feedback = Arc::new(FnFeedback(f));
        self
    }

    /// Maximum number of regeneration attempts.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The delay schedule.
    #[must_use]
    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Regenerate until the output guardrails pass or retries run out.
///
/// Returns the last (generation, summary) pair either way; the caller
/// inspects `summary.is_blocked()` to apply its policy. Provider errors
/// propagate immediately. The total number of provider calls is bounded
/// by `max_retries` on top of the original call that produced `summary`.
pub(crate) async fn regenerate(
    provider: &dyn Provider,
    output_guardrails: &[Guardrail],
    options: &ExecutionOptions,
    policy: &RetryPolicy,
    request: &GenerationRequest,
    mut generation: Generation,
    mut summary: ExecutionSummary,
) -> Result<(Generation, ExecutionSummary)> {
    let mut request = request.clone();
    for attempt in 1..=policy.max_retries {
        let delay = policy.backoff.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        request = policy.feedback.rebuild(&summary, &request);
        debug!(
            attempt,
            max_retries = policy.max_retries,
            blocked = ?summary.blocked_names(),
            "Regenerating after blocked output"
        );

        generation = provider.generate(&request).await?;
        let ctx = GuardrailContext::with_generation(request.clone(), generation.clone());
        summary = Executor::execute(output_guardrails, &ctx, options).await;
        if !summary.is_blocked() {
            debug!(attempt, "Regeneration accepted");
            return Ok((generation, summary));
        }
    }
    Ok((generation, summary))
}
