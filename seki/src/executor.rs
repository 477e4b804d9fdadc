//! Guardrail scheduling and execution.
//!
//! The executor filters out disabled guardrails, orders the rest by
//! priority (stable, so equal priorities keep their registration order),
//! and runs them either concurrently or one at a time. Each check races a
//! deadline; a check that errors or overruns is recorded as a synthetic
//! critical result and never disturbs its siblings.

use std::cmp::Reverse;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::context::GuardrailContext;
use crate::guardrail::{ExecutionSummary, Guardrail, GuardrailResult};

/// Knobs for one guardrail run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Run all guardrails concurrently. When `false` they run one at a
    /// time in priority order.
    pub parallel: bool,
    /// Per-guardrail deadline.
    pub timeout: Duration,
    /// In sequential mode, keep going after a tripwire. When `false` the
    /// run stops at the first trip and later guardrails leave no result.
    pub continue_on_failure: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            timeout: Duration::from_secs(30),
            continue_on_failure: true,
        }
    }
}

impl ExecutionOptions {
    /// Set concurrent execution on or off.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the per-guardrail deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set whether sequential runs continue past a tripwire.
    #[must_use]
    pub const fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }
}

/// Stateless guardrail execution engine.
#[derive(Debug, Clone, Copy)]
pub struct Executor;

impl Executor {
    /// Run `guardrails` against `ctx`.
    ///
    /// Results arrive in priority order regardless of mode: parallel runs
    /// collect in scheduling order, sequential runs execute in it. The
    /// summary holds one result per executed guardrail; disabled ones and
    /// those skipped by an early stop leave none.
    pub async fn execute(
        guardrails: &[Guardrail],
        ctx: &GuardrailContext,
        options: &ExecutionOptions,
    ) -> ExecutionSummary {
        let scheduled = Self::schedule(guardrails);
        debug!(
            total = guardrails.len(),
            scheduled = scheduled.len(),
            parallel = options.parallel,
            "Executing guardrails"
        );

        let results = if options.parallel {
            Self::execute_parallel(&scheduled, ctx, options).await
        } else {
            Self::execute_sequential(&scheduled, ctx, options).await
        };
        ExecutionSummary::new(results)
    }

    /// Enabled guardrails in execution order: priority descending, ties
    /// by registration order.
    fn schedule(guardrails: &[Guardrail]) -> Vec<&Guardrail> {
        let mut scheduled: Vec<&Guardrail> =
            guardrails.iter().filter(|g| g.is_enabled()).collect();
        scheduled.sort_by_key(|g| Reverse(g.priority().rank()));
        scheduled
    }

    async fn execute_parallel(
        scheduled: &[&Guardrail],
        ctx: &GuardrailContext,
        options: &ExecutionOptions,
    ) -> Vec<GuardrailResult> {
        // join_all preserves input order, so results stay deterministic
        // no matter which check finishes first.
        join_all(
            scheduled
                .iter()
                .map(|guardrail| Self::run_one(guardrail, ctx, options.timeout)),
        )
        .await
    }

    async fn execute_sequential(
        scheduled: &[&Guardrail],
        ctx: &GuardrailContext,
        options: &ExecutionOptions,
    ) -> Vec<GuardrailResult> {
        let mut results = Vec::with_capacity(scheduled.len());
        for guardrail in scheduled {
            let result = Self::run_one(guardrail, ctx, options.timeout).await;
            let stop = result.is_triggered() && !options.continue_on_failure;
            results.push(result);
            if stop {
                debug!(
                    guardrail = %guardrail.name(),
                    "Stopping sequential run after tripwire"
                );
                break;
            }
        }
        results
    }

    /// Race one guardrail against the deadline. The losing check future
    /// is dropped, which cancels it at its next suspension point.
    async fn run_one(
        guardrail: &Guardrail,
        ctx: &GuardrailContext,
        timeout: Duration,
    ) -> GuardrailResult {
        match tokio::time::timeout(timeout, guardrail.run(ctx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    guardrail = %guardrail.name(),
                    timeout_ms = timeout.as_millis(),
                    "Guardrail timed out"
                );
                guardrail.timeout_result(timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GenerationRequest;
    use crate::guardrail::{CheckError, GuardrailCheck, GuardrailOutput, Priority};
    use async_trait::async_trait;

    fn ctx() -> GuardrailContext {
        GuardrailContext::from_request(GenerationRequest::from_prompt("hello"))
    }

    fn passing(name: &str, priority: Priority) -> Guardrail {
        Guardrail::from_fn(name, |_| Ok(GuardrailOutput::pass())).with_priority(priority)
    }

    fn tripping(name: &str, priority: Priority) -> Guardrail {
        Guardrail::from_fn(name, |_| Ok(GuardrailOutput::tripwire("tripped")))
            .with_priority(priority)
    }

    struct Sleepy(Duration);

    #[async_trait]
    impl GuardrailCheck for Sleepy {
        async fn check(&self, _ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
            tokio::time::sleep(self.0).await;
            Ok(GuardrailOutput::pass())
        }
    }

    fn names(summary: &ExecutionSummary) -> Vec<&str> {
        summary
            .results()
            .iter()
            .map(|r| r.guardrail_name.as_str())
            .collect()
    }

    #[tokio::test]
    async fn results_follow_priority_order_with_stable_ties() {
        let guardrails = vec![
            passing("medium-1", Priority::Medium),
            passing("critical", Priority::Critical),
            passing("medium-2", Priority::Medium),
            passing("low", Priority::Low),
            passing("high", Priority::High),
        ];
        let expected = ["critical", "high", "medium-1", "medium-2", "low"];

        let parallel = Executor::execute(&guardrails, &ctx(), &ExecutionOptions::default()).await;
        assert_eq!(names(&parallel), expected);

        let sequential = Executor::execute(
            &guardrails,
            &ctx(),
            &ExecutionOptions::default().with_parallel(false),
        )
        .await;
        assert_eq!(names(&sequential), expected);
    }

    #[tokio::test]
    async fn reruns_with_stateless_guardrails_match_modulo_timing() {
        let guardrails = vec![
            tripping("gate", Priority::High),
            passing("echo", Priority::Low),
        ];
        let fingerprint = |summary: &ExecutionSummary| -> Vec<(String, String, bool, Option<String>)> {
            summary
                .results()
                .iter()
                .map(|r| {
                    (
                        r.guardrail_name.clone(),
                        r.guardrail_version.clone(),
                        r.is_triggered(),
                        r.message.clone(),
                    )
                })
                .collect()
        };

        let first = Executor::execute(&guardrails, &ctx(), &ExecutionOptions::default()).await;
        let second = Executor::execute(&guardrails, &ctx(), &ExecutionOptions::default()).await;
        assert_eq!(fingerprint(&first), fingerprint(&second));
    }

    #[tokio::test]
    async fn disabled_guardrails_leave_no_result() {
        let guardrails = vec![
            passing("on", Priority::Medium),
            passing("off", Priority::Critical).with_enabled(false),
        ];
        let summary = Executor::execute(&guardrails, &ctx(), &ExecutionOptions::default()).await;
        assert_eq!(names(&summary), ["on"]);
    }

    #[tokio::test]
    async fn parallel_order_is_deterministic_despite_staggered_finishes() {
        // The highest-priority guardrail finishes last; it must still be
        // first in the summary.
        let guardrails = vec![
            Guardrail::new("slow-critical", Sleepy(Duration::from_millis(30)))
                .with_priority(Priority::Critical),
            Guardrail::new("fast-low", Sleepy(Duration::from_millis(1)))
                .with_priority(Priority::Low),
        ];
        let summary = Executor::execute(&guardrails, &ctx(), &ExecutionOptions::default()).await;
        assert_eq!(names(&summary), ["slow-critical", "fast-low"]);
    }

    #[tokio::test]
    async fn sequential_stops_at_first_trip_when_asked() {
        let guardrails = vec![
            tripping("always-trips", Priority::Critical),
            passing("never-trips", Priority::Low),
        ];
        let options = ExecutionOptions::default()
            .with_parallel(false)
            .with_continue_on_failure(false);
        let summary = Executor::execute(&guardrails, &ctx(), &options).await;
        assert_eq!(summary.len(), 1);
        assert_eq!(names(&summary), ["always-trips"]);
        assert!(summary.is_blocked());
    }

    #[tokio::test]
    async fn sequential_continues_past_trips_by_default() {
        let guardrails = vec![
            tripping("trips", Priority::Critical),
            passing("still-runs", Priority::Low),
        ];
        let options = ExecutionOptions::default().with_parallel(false);
        let summary = Executor::execute(&guardrails, &ctx(), &options).await;
        assert_eq!(names(&summary), ["trips", "still-runs"]);
    }

    #[tokio::test]
    async fn timeout_becomes_failure_result_and_siblings_finish() {
        let guardrails = vec![
            Guardrail::new("stuck", Sleepy(Duration::from_secs(5)))
                .with_priority(Priority::High),
            passing("fine", Priority::Low),
        ];
        let options = ExecutionOptions::default().with_timeout(Duration::from_millis(20));
        let summary = Executor::execute(&guardrails, &ctx(), &options).await;

        assert_eq!(summary.len(), 2);
        let stuck = &summary.results()[0];
        assert!(stuck.is_triggered());
        assert!(stuck.is_execution_failure());
        assert!(
            stuck
                .message_or_default()
                .starts_with("Guardrail execution failed: timed out")
        );
        assert!(!summary.results()[1].is_triggered());
    }

    #[tokio::test]
    async fn empty_set_yields_empty_summary() {
        let summary = Executor::execute(&[], &ctx(), &ExecutionOptions::default()).await;
        assert!(summary.is_empty());
        assert!(!summary.is_blocked());
    }
}
