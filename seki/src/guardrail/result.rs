//! Execution records: what each guardrail said, and the run as a whole.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{GuardrailOutput, Severity};

/// One guardrail's verdict, stamped with identity and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    /// Name of the guardrail that produced this result.
    pub guardrail_name: String,
    /// Version of the guardrail that produced this result.
    pub guardrail_version: String,
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
    /// Check-specific details. Synthetic failure results always carry an
    /// `error` key here.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// When the check ran.
    pub executed_at: DateTime<Utc>,
    /// How long the check took.
    pub execution_time: Duration,
}

impl GuardrailResult {
    /// Stamp an output with the guardrail's identity. The timestamp is
    /// taken now; timing is attached separately.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        output: GuardrailOutput,
    ) -> Self {
        Self {
            guardrail_name: name.into(),
            guardrail_version: version.into(),
            tripwire_triggered: output.tripwire_triggered,
            message: output.message,
            severity: output.severity,
            suggestion: output.suggestion,
            metadata: output.metadata,
            executed_at: Utc::now(),
            execution_time: Duration::ZERO,
        }
    }

    /// Attach the measured execution time.
    #[must_use]
    pub const fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed;
        self
    }

    /// Whether the tripwire was raised.
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        self.tripwire_triggered
    }

    /// Whether this is a synthetic result standing in for a check that
    /// errored or timed out, rather than a genuine verdict.
    #[must_use]
    pub fn is_execution_failure(&self) -> bool {
        self.metadata.contains_key("error")
    }

    /// The message, or a generic placeholder when the check stayed mute.
    #[must_use]
    pub fn message_or_default(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or("guardrail tripwire triggered")
    }
}

/// Ordered results of one guardrail run.
///
/// Blocking views are derived from the owned list on demand, so the
/// blocked subset can never drift out of sync with the full set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    results: Vec<GuardrailResult>,
}

impl ExecutionSummary {
    /// Wrap an ordered result list.
    #[must_use]
    pub const fn new(results: Vec<GuardrailResult>) -> Self {
        Self { results }
    }

    /// Every result, in execution (priority) order.
    #[must_use]
    pub fn results(&self) -> &[GuardrailResult] {
        &self.results
    }

    /// Results whose tripwire was raised, in order.
    #[must_use]
    pub fn blocked(&self) -> Vec<&GuardrailResult> {
        self.results.iter().filter(|r| r.is_triggered()).collect()
    }

    /// Whether any tripwire was raised.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.results.iter().any(GuardrailResult::is_triggered)
    }

    /// The first triggered result, if any.
    #[must_use]
    pub fn first_blocked(&self) -> Option<&GuardrailResult> {
        self.results.iter().find(|r| r.is_triggered())
    }

    /// Names of every triggered guardrail, in order.
    #[must_use]
    pub fn blocked_names(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_triggered())
            .map(|r| r.guardrail_name.as_str())
            .collect()
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the run produced no results at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Consume the summary, yielding the owned results.
    #[must_use]
    pub fn into_results(self) -> Vec<GuardrailResult> {
        self.results
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "guardrails: {} run, {} triggered",
            self.results.len(),
            self.blocked().len()
        )?;
        for result in &self.results {
            let mark = if result.is_triggered() { "x" } else { " " };
            write!(
                f,
                "  [{mark}] {} v{} ({}ms)",
                result.guardrail_name,
                result.guardrail_version,
                result.execution_time.as_millis()
            )?;
            if let Some(message) = &result.message {
                write!(f, ": {message}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
