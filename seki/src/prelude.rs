//! One-stop imports for the common path.

pub use crate::agent::{Agent, AgentRun, ToolHandler};
pub use crate::context::{Generation, GenerationRequest, GuardrailContext, Message};
pub use crate::error::{Error, ProviderError, Result};
pub use crate::executor::{ExecutionOptions, Executor};
pub use crate::guarded::{BlockMode, GuardedProvider};
pub use crate::guardrail::{
    ExecutionSummary, Guardrail, GuardrailCheck, GuardrailOutput, GuardrailResult, Priority,
    Severity,
};
pub use crate::hooks::GuardHooks;
pub use crate::provider::Provider;
pub use crate::retry::{Backoff, CorrectiveFeedback, RetryPolicy};
pub use crate::streaming::{GuardedStream, StreamEvent, StreamOutcome};
