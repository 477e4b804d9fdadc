//! Length checks. All lengths are counted in characters, not bytes.

use async_trait::async_trait;

use crate::context::GuardrailContext;
use crate::guardrail::{CheckError, GuardrailCheck, GuardrailOutput, Severity};

/// Trips when the combined input text exceeds a maximum length.
///
/// Metadata: `length`, `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxInputLength {
    max: usize,
}

impl MaxInputLength {
    /// Limit input to `max` characters.
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self { max }
    }
}

#[async_trait]
impl GuardrailCheck for MaxInputLength {
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
        let length = ctx.input_text().chars().count();
        if length > self.max {
            Ok(GuardrailOutput::tripwire(format!(
                "Input exceeds maximum length of {} characters",
                self.max
            ))
            .with_severity(Severity::High)
            .with_metadata("length", length)
            .with_metadata("max", self.max))
        } else {
            Ok(GuardrailOutput::pass())
        }
    }
}

/// Trips when the generated text is shorter than a minimum length.
///
/// Passes while there is no generation to measure, so it can sit in an
/// output list without special-casing input runs. Metadata: `length`,
/// `min`, `deficit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinOutputLength {
    min: usize,
}

impl MinOutputLength {
    /// Require at least `min` characters of output.
    #[must_use]
    pub const fn new(min: usize) -> Self {
        Self { min }
    }
}

#[async_trait]
impl GuardrailCheck for MinOutputLength {
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
        let Some(text) = ctx.output_text() else {
            return Ok(GuardrailOutput::pass());
        };
        let length = text.chars().count();
        if length < self.min {
            Ok(GuardrailOutput::tripwire(format!(
                "Response is too short: {length} characters (minimum {})",
                self.min
            ))
            .with_severity(Severity::Medium)
            .with_suggestion(format!(
                "Provide a more detailed response of at least {} characters",
                self.min
            ))
            .with_metadata("length", length)
            .with_metadata("min", self.min)
            .with_metadata("deficit", self.min - length))
        } else {
            Ok(GuardrailOutput::pass())
        }
    }
}

/// Trips when the generated text exceeds a maximum length.
///
/// Metadata: `length`, `max`, `excess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxOutputLength {
    max: usize,
}

impl MaxOutputLength {
    /// Limit output to `max` characters.
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self { max }
    }
}

#[async_trait]
impl GuardrailCheck for MaxOutputLength {
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
        let Some(text) = ctx.output_text() else {
            return Ok(GuardrailOutput::pass());
        };
        let length = text.chars().count();
        if length > self.max {
            Ok(GuardrailOutput::tripwire(format!(
                "Response exceeds maximum length of {} characters",
                self.max
            ))
            .with_severity(Severity::Medium)
            .with_suggestion(format!("Shorten the response to at most {} characters", self.max))
            .with_metadata("length", length)
            .with_metadata("max", self.max)
            .with_metadata("excess", length - self.max))
        } else {
            Ok(GuardrailOutput::pass())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Generation, GenerationRequest};
    use serde_json::Value;

    fn input_ctx(prompt: &str) -> GuardrailContext {
        GuardrailContext::from_request(GenerationRequest::from_prompt(prompt))
    }

    fn output_ctx(text: &str) -> GuardrailContext {
        GuardrailContext::with_generation(
            GenerationRequest::from_prompt("q"),
            Generation::from_text(text),
        )
    }

    #[tokio::test]
    async fn max_input_trips_over_the_limit_and_names_it() {
        let check = MaxInputLength::new(100);
        let long_prompt = "x".repeat(150);
        let output = check.check(&input_ctx(&long_prompt)).await.unwrap();

        assert!(output.is_triggered());
        assert_eq!(
            output.message.as_deref(),
            Some("Input exceeds maximum length of 100 characters")
        );
        assert_eq!(output.metadata.get("length"), Some(&Value::from(150)));
        assert_eq!(output.metadata.get("max"), Some(&Value::from(100)));
    }

    #[tokio::test]
    async fn max_input_passes_at_the_limit() {
        let check = MaxInputLength::new(100);
        let output = check.check(&input_ctx(&"x".repeat(100))).await.unwrap();
        assert!(!output.is_triggered());
    }

    #[tokio::test]
    async fn lengths_count_characters_not_bytes() {
        let check = MaxInputLength::new(4);
        // Four characters, twelve bytes.
        let output = check.check(&input_ctx("日本語だ")).await.unwrap();
        assert!(!output.is_triggered());
    }

    #[tokio::test]
    async fn min_output_reports_the_deficit() {
        let check = MinOutputLength::new(50);
        let output = check.check(&output_ctx("Yes.")).await.unwrap();

        assert!(output.is_triggered());
        assert_eq!(
            output.message.as_deref(),
            Some("Response is too short: 4 characters (minimum 50)")
        );
        assert_eq!(output.metadata.get("deficit"), Some(&Value::from(46)));
        assert!(output.suggestion.is_some());
    }

    #[tokio::test]
    async fn min_output_ignores_missing_generations() {
        let check = MinOutputLength::new(50);
        let output = check.check(&input_ctx("anything")).await.unwrap();
        assert!(!output.is_triggered());
    }

    #[tokio::test]
    async fn max_output_reports_the_excess() {
        let check = MaxOutputLength::new(10);
        let output = check.check(&output_ctx(&"y".repeat(25))).await.unwrap();

        assert!(output.is_triggered());
        assert_eq!(output.metadata.get("excess"), Some(&Value::from(15)));
    }

    #[tokio::test]
    async fn max_output_passes_within_the_limit() {
        let check = MaxOutputLength::new(10);
        let output = check.check(&output_ctx("short")).await.unwrap();
        assert!(!output.is_triggered());
    }
}
