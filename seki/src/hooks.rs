//! Observer hooks for guardrail verdicts.
//!
//! Hooks fire whenever a stage blocks, before the blocking policy is
//! applied, so they see every block even when the caller ultimately
//! swallows it (warn mode, retry, fallback). They observe and must not
//! steer: the summary is borrowed, and the return is `()`.

use async_trait::async_trait;

use crate::guardrail::ExecutionSummary;

/// Callbacks observing blocked guardrail runs.
///
/// All methods default to no-ops; implement only what you care about.
#[async_trait]
pub trait GuardHooks: Send + Sync {
    /// An input-stage run tripped at least one wire. Fires before the
    /// model would have been invoked.
    async fn input_blocked(&self, summary: &ExecutionSummary) {
        let _ = summary;
    }

    /// An output-stage run tripped at least one wire. Fires once per
    /// logical invocation, on the first blocking run, even when retries
    /// later produce more.
    async fn output_blocked(&self, summary: &ExecutionSummary) {
        let _ = summary;
    }
}

/// The do-nothing hook set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGuardHooks;

#[async_trait]
impl GuardHooks for NoopGuardHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::{GuardrailOutput, GuardrailResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        input: AtomicUsize,
        output: AtomicUsize,
    }

    #[async_trait]
    impl GuardHooks for Counting {
        async fn input_blocked(&self, _summary: &ExecutionSummary) {
            self.input.fetch_add(1, Ordering::SeqCst);
        }

        async fn output_blocked(&self, _summary: &ExecutionSummary) {
            self.output.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn summary() -> ExecutionSummary {
        ExecutionSummary::new(vec![GuardrailResult::new(
            "g",
            "1.0.0",
            GuardrailOutput::tripwire("no"),
        )])
    }

    #[tokio::test]
    async fn noop_hooks_do_nothing() {
        NoopGuardHooks.input_blocked(&summary()).await;
        NoopGuardHooks.output_blocked(&summary()).await;
    }

    #[tokio::test]
    async fn custom_hooks_observe_each_stage() {
        let hooks = Counting::default();
        hooks.input_blocked(&summary()).await;
        hooks.output_blocked(&summary()).await;
        hooks.output_blocked(&summary()).await;
        assert_eq!(hooks.input.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.output.load(Ordering::SeqCst), 2);
    }
}
