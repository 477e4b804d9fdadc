//! Guardrails over streaming generations.
//!
//! Output checks need the whole generation, but streaming callers want
//! chunks now. [`GuardedStream`] forwards every chunk the moment it
//! arrives while accumulating a private copy; when the upstream ends
//! naturally, the accumulated text is materialized as a generation and
//! the output guardrails run over it. The final event is either
//! [`StreamEvent::Completed`] or a blocked error, so consumers that
//! display chunks eagerly must be prepared to retract on the last event.
//!
//! Retries do not apply here: the chunks are already gone. An upstream
//! error ends the stream immediately and the guardrails never run.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use tracing::warn;

use crate::context::{Generation, GenerationRequest, GuardrailContext};
use crate::error::{Error, ProviderError, Result};
use crate::executor::{ExecutionOptions, Executor};
use crate::guarded::BlockMode;
use crate::guardrail::{ExecutionSummary, Guardrail};
use crate::hooks::GuardHooks;
use crate::provider::ChunkStream;

/// One event from a guarded stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text delta, forwarded as it arrived.
    Chunk(String),
    /// The stream ended and the output guardrails passed (or the mode is
    /// warn). Always the final event when present.
    Completed(StreamOutcome),
}

/// The materialized generation and its guardrail verdicts.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// The full generation, rebuilt from the forwarded chunks.
    pub generation: Generation,
    /// Results of the output guardrail run.
    pub summary: ExecutionSummary,
}

/// Everything the end-of-stream check needs, detached from the stream so
/// the verdict future can own it.
struct CheckPlan {
    guardrails: Vec<Guardrail>,
    request: GenerationRequest,
    options: ExecutionOptions,
    mode: BlockMode,
    hooks: Arc<dyn GuardHooks>,
}

enum StreamState {
    /// Forwarding upstream chunks while buffering a copy.
    Forwarding { inner: ChunkStream, buffer: String },
    /// Upstream is done; the guardrail verdict is in flight.
    Checking(BoxFuture<'static, Result<StreamEvent>>),
    /// Nothing more to yield.
    Done,
}

/// A provider stream wrapped in end-of-stream output guardrails.
pub struct GuardedStream {
    state: StreamState,
    plan: Option<CheckPlan>,
}

impl GuardedStream {
    pub(crate) fn new(
        inner: ChunkStream,
        guardrails: Vec<Guardrail>,
        request: GenerationRequest,
        options: ExecutionOptions,
        mode: BlockMode,
        hooks: Arc<dyn GuardHooks>,
    ) -> Self {
        Self {
            state: StreamState::Forwarding {
                inner,
                buffer: String::new(),
            },
            plan: Some(CheckPlan {
                guardrails,
                request,
                options,
                mode,
                hooks,
            }),
        }
    }

    /// Drain the stream, discarding chunks, and return the final outcome.
    ///
    /// # Errors
    ///
    /// Whatever the stream would have yielded as its terminal error:
    /// an upstream [`Error::Provider`] or [`Error::OutputBlocked`].
    pub async fn finish(mut self) -> Result<StreamOutcome> {
        while let Some(event) = self.next().await {
            if let StreamEvent::Completed(outcome) = event? {
                return Ok(outcome);
            }
        }
        Err(ProviderError::internal("guarded-stream", "stream ended without a verdict").into())
    }
}

async fn verdict(plan: CheckPlan, text: String) -> Result<StreamEvent> {
    let generation = Generation::from_text(text);
    let ctx = GuardrailContext::with_generation(plan.request, generation.clone());
    let summary = Executor::execute(&plan.guardrails, &ctx, &plan.options).await;

    if summary.is_blocked() {
        plan.hooks.output_blocked(&summary).await;
        match plan.mode {
            BlockMode::Reject => return Err(Error::output_blocked(summary)),
            BlockMode::Warn => {
                warn!(
                    blocked = ?summary.blocked_names(),
                    "Streamed output tripped guardrails; completing in warn mode"
                );
            }
        }
    }
    Ok(StreamEvent::Completed(StreamOutcome {
        generation,
        summary,
    }))
}

impl Stream for GuardedStream {
    type Item = Result<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                StreamState::Forwarding { inner, buffer } => {
                    match inner.as_mut().poll_next(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Ok(chunk))) => {
                            buffer.push_str(&chunk);
                            return Poll::Ready(Some(Ok(StreamEvent::Chunk(chunk))));
                        }
                        Poll::Ready(Some(Err(err))) => {
                            this.state = StreamState::Done;
                            return Poll::Ready(Some(Err(err.into())));
                        }
                        Poll::Ready(None) => {
                            let text = std::mem::take(buffer);
                            let Some(plan) = this.plan.take() else {
                                this.state = StreamState::Done;
                                return Poll::Ready(None);
                            };
                            this.state = StreamState::Checking(Box::pin(verdict(plan, text)));
                        }
                    }
                }
                StreamState::Checking(future) => match future.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(event) => {
                        this.state = StreamState::Done;
                        return Poll::Ready(Some(event));
                    }
                },
                StreamState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl fmt::Debug for GuardedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            StreamState::Forwarding { buffer, .. } => {
                format!("Forwarding({} bytes buffered)", buffer.len())
            }
            StreamState::Checking(_) => "Checking".to_owned(),
            StreamState::Done => "Done".to_owned(),
        };
        f.debug_struct("GuardedStream")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
