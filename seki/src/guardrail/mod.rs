//! Guardrails: named safety and quality checks around model calls.
//!
//! A [`Guardrail`] wraps a [`GuardrailCheck`] predicate with identity
//! (name, version), scheduling metadata (priority, enabled flag, tags),
//! and failure containment. Checks inspect a [`GuardrailContext`] and
//! report a [`GuardrailOutput`].
//!
//! # Tripwire Mechanism
//!
//! Checks never fail a call directly. They raise a tripwire by returning
//! an output with `tripwire_triggered` set, and the caller decides what a
//! tripped wire means (throw, warn, retry, fall back). A check that
//! panics into an `Err` or runs past its deadline is converted into a
//! synthetic critical result rather than aborting its siblings, so one
//! broken check can never take down the whole run.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seki::guardrail::{Guardrail, GuardrailOutput, Priority};
//!
//! let no_shouting = Guardrail::from_fn("no-shouting", |ctx| {
//!     let text = ctx.input_text();
//!     if text.chars().filter(char::is_ascii_uppercase).count() > 20 {
//!         Ok(GuardrailOutput::tripwire("too much shouting"))
//!     } else {
//!         Ok(GuardrailOutput::pass())
//!     }
//! })
//! .with_priority(Priority::Low);
//! ```

mod result;

pub use result::{ExecutionSummary, GuardrailResult};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::context::GuardrailContext;

/// Default version recorded on guardrails that never set one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Errors a check may return. They are contained, never propagated: the
/// executor converts them into synthetic failure results.
pub type CheckError = Box<dyn std::error::Error + Send + Sync>;

/// How bad a tripped wire is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic or advisory.
    Low,
    /// Worth attention, not worth blocking on its own.
    Medium,
    /// Should usually block.
    High,
    /// Must block.
    Critical,
}

/// Execution priority. Higher priorities run (or are ordered) first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Last in line.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Ahead of the pack.
    High,
    /// First, always.
    Critical,
}

impl Priority {
    /// Numeric rank used for ordering; higher runs earlier.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

/// What a check reports back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailOutput {
    /// Whether the tripwire was raised.
    pub tripwire_triggered: bool,
    /// Human-readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// How bad a trip is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Corrective hint, consumed by retry feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Open record of check-specific details. Built-in checks document
    /// the keys they populate.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl GuardrailOutput {
    /// A clean pass with no commentary.
    #[must_use]
    pub fn pass() -> Self {
        Self::default()
    }

    /// A pass that still has something to say.
    #[must_use]
    pub fn pass_with_info(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Raise the tripwire.
    #[must_use]
    pub fn tripwire(message: impl Into<String>) -> Self {
        Self {
            tripwire_triggered: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Set the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach a corrective suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Record one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the tripwire was raised.
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        self.tripwire_triggered
    }
}

impl From<&str> for GuardrailOutput {
    /// Treat a bare string as a tripped wire with that message.
    fn from(message: &str) -> Self {
        Self::tripwire(message)
    }
}

/// The predicate at the heart of a guardrail.
///
/// Implementations inspect the context and report an output. Returning
/// `Err` marks the check itself as broken; the run records a synthetic
/// critical result in its place and other guardrails are unaffected.
#[async_trait]
pub trait GuardrailCheck: Send + Sync {
    /// Evaluate the context.
    ///
    /// # Errors
    ///
    /// Returns an error when the check itself breaks. The executor
    /// contains it as a synthetic critical result.
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError>;
}

/// Adapter turning a plain closure into a [`GuardrailCheck`].
struct FnCheck<F>(F);

#[async_trait]
impl<F> GuardrailCheck for FnCheck<F>
where
    F: Fn(&GuardrailContext) -> Result<GuardrailOutput, CheckError> + Send + Sync,
{
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
        (self.0)(ctx)
    }
}

/// A named, versioned, prioritized check.
///
/// Cloning is cheap; the underlying check is shared.
#[derive(Clone)]
pub struct Guardrail {
    name: String,
    version: String,
    priority: Priority,
    enabled: bool,
    tags: Vec<String>,
    check: Arc<dyn GuardrailCheck>,
}

impl Guardrail {
    /// Create a guardrail around a check implementation.
    #[must_use]
    pub fn new(name: impl Into<String>, check: impl GuardrailCheck + 'static) -> Self {
        Self {
            name: name.into(),
            version: DEFAULT_VERSION.to_owned(),
            priority: Priority::default(),
            enabled: true,
            tags: Vec::new(),
            check: Arc::new(check),
        }
    }

    /// Create a guardrail from a synchronous closure.
    #[must_use]
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&GuardrailContext) -> Result<GuardrailOutput, CheckError> + Send + Sync + 'static,
    {
        Self::new(name, FnCheck(f))
    }

    /// Set the version recorded on results.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the execution priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Enable or disable this guardrail. Disabled guardrails are skipped
    /// entirely and leave no result.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Attach one tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace the tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// The guardrail's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The guardrail's version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The execution priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether this guardrail participates in runs.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The attached tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Run the check against a context. Never fails: a broken check is
    /// reported as a synthetic critical result.
    pub async fn run(&self, ctx: &GuardrailContext) -> GuardrailResult {
        let started = Instant::now();
        match self.check.check(ctx).await {
            Ok(output) => GuardrailResult::new(&self.name, &self.version, output)
                .with_execution_time(started.elapsed()),
            Err(err) => {
                warn!(guardrail = %self.name, error = %err, "Guardrail check failed");
                self.execution_failure(&err.to_string(), started.elapsed())
            }
        }
    }

    /// Synthetic result for a check that errored out.
    pub(crate) fn execution_failure(&self, reason: &str, elapsed: Duration) -> GuardrailResult {
        let output = GuardrailOutput::tripwire(format!("Guardrail execution failed: {reason}"))
            .with_severity(Severity::Critical)
            .with_metadata("error", reason);
        GuardrailResult::new(&self.name, &self.version, output).with_execution_time(elapsed)
    }

    /// Synthetic result for a check that ran past the deadline.
    pub(crate) fn timeout_result(&self, timeout: Duration) -> GuardrailResult {
        let reason = format!("timed out after {}ms", timeout.as_millis());
        self.execution_failure(&reason, timeout)
    }
}

impl fmt::Debug for Guardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guardrail")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
