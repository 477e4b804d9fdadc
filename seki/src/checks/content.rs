//! Content checks: blocked terms and regex filters.

use std::borrow::Cow;

use async_trait::async_trait;
use regex::Regex;

use crate::context::GuardrailContext;
use crate::guardrail::{CheckError, GuardrailCheck, GuardrailOutput, Severity};

/// Which side of the model call a content check scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// The prompt and user messages.
    Input,
    /// The generated text.
    Output,
}

/// The text a source selects, if present. Output checks see nothing
/// before the model has answered and pass vacuously.
fn select_text(ctx: &GuardrailContext, source: TextSource) -> Option<Cow<'_, str>> {
    match source {
        TextSource::Input => Some(Cow::Owned(ctx.input_text())),
        TextSource::Output => ctx.output_text().map(Cow::Borrowed),
    }
}

/// Trips when the text contains any of a fixed list of substrings.
///
/// Matching is case-insensitive by default. Metadata: `pattern` (the
/// first one found).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedPatterns {
    patterns: Vec<String>,
    source: TextSource,
    case_sensitive: bool,
}

impl BlockedPatterns {
    /// Block these substrings in the input.
    #[must_use]
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            source: TextSource::Input,
            case_sensitive: false,
        }
    }

    /// Scan a different side of the call.
    #[must_use]
    pub const fn with_source(mut self, source: TextSource) -> Self {
        self.source = source;
        self
    }

    /// Match case-sensitively.
    #[must_use]
    pub const fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    fn find_match(&self, text: &str) -> Option<&str> {
        if self.case_sensitive {
            self.patterns
                .iter()
                .find(|p| text.contains(p.as_str()))
                .map(String::as_str)
        } else {
            let lowered = text.to_lowercase();
            self.patterns
                .iter()
                .find(|p| lowered.contains(&p.to_lowercase()))
                .map(String::as_str)
        }
    }
}

#[async_trait]
impl GuardrailCheck for BlockedPatterns {
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
        let Some(text) = select_text(ctx, self.source) else {
            return Ok(GuardrailOutput::pass());
        };
        match self.find_match(&text) {
            Some(pattern) => Ok(GuardrailOutput::tripwire(format!(
                "Content contains blocked pattern: '{pattern}'"
            ))
            .with_severity(Severity::High)
            .with_metadata("pattern", pattern)),
            None => Ok(GuardrailOutput::pass()),
        }
    }
}

/// Trips when the text matches a regular expression.
///
/// Metadata: `pattern`, `matched` (the first match).
#[derive(Debug, Clone)]
pub struct RegexFilter {
    regex: Regex,
    source: TextSource,
}

impl RegexFilter {
    /// Filter input text against `pattern`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`regex::Error`] when the pattern does not
    /// compile.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            source: TextSource::Input,
        })
    }

    /// Wrap an already-compiled regex.
    #[must_use]
    pub const fn from_regex(regex: Regex) -> Self {
        Self {
            regex,
            source: TextSource::Input,
        }
    }

    /// Scan a different side of the call.
    #[must_use]
    pub const fn with_source(mut self, source: TextSource) -> Self {
        self.source = source;
        self
    }
}

#[async_trait]
impl GuardrailCheck for RegexFilter {
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
        let Some(text) = select_text(ctx, self.source) else {
            return Ok(GuardrailOutput::pass());
        };
        match self.regex.find(&text) {
            Some(found) => Ok(GuardrailOutput::tripwire(
                "Content matches a forbidden pattern",
            )
            .with_severity(Severity::High)
            .with_metadata("pattern", self.regex.as_str())
            .with_metadata("matched", found.as_str())),
            None => Ok(GuardrailOutput::pass()),
        }
    }
}
