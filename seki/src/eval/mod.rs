//! Offline guardrail evaluation.
//!
//! Given a dataset of labeled contexts (should this guardrail trip here,
//! or not?), the evaluator runs the real guardrails over every sample
//! and scores them: confusion counts, precision/recall/F1, accuracy, and
//! latency percentiles, rolled up into an [`EvaluationReport`] with
//! plain-language recommendations.
//!
//! Datasets are JSONL, one sample per line:
//!
//! ```text
//! {"input": {"request": {"prompt": "hi"}}, "expected": {"max-input": false}}
//! {"input": {"request": {"prompt": "..."}}, "expected": {"max-input": true}}
//! ```

mod metrics;
mod report;

pub use metrics::GuardrailMetrics;
pub use report::EvaluationReport;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::GuardrailContext;
use crate::error::{Error, Result};
use crate::executor::{ExecutionOptions, Executor};
use crate::guardrail::{ExecutionSummary, Guardrail};

/// One labeled evaluation case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The context to run the guardrails over.
    pub input: GuardrailContext,
    /// Expected verdict per guardrail name: `true` means the tripwire
    /// should trigger. Guardrails absent from the map are unscored for
    /// this sample.
    pub expected: BTreeMap<String, bool>,
}

impl Sample {
    /// Create a sample expecting one verdict.
    #[must_use]
    pub fn new(input: GuardrailContext, guardrail: impl Into<String>, should_trip: bool) -> Self {
        let mut expected = BTreeMap::new();
        expected.insert(guardrail.into(), should_trip);
        Self { input, expected }
    }

    /// Add another expected verdict.
    #[must_use]
    pub fn expect(mut self, guardrail: impl Into<String>, should_trip: bool) -> Self {
        self.expected.insert(guardrail.into(), should_trip);
        self
    }
}

/// An ordered collection of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Wrap an in-memory sample list.
    #[must_use]
    pub const fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Parse JSONL text: one sample per line, blank lines skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Dataset`] naming the offending line when any non-blank
    /// line fails to parse.
    pub fn from_jsonl(text: &str) -> Result<Self> {
        let mut samples = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let sample = serde_json::from_str(line)
                .map_err(|e| Error::dataset(format!("line {}: {e}", index + 1)))?;
            samples.push(sample);
        }
        Ok(Self { samples })
    }

    /// Read and parse a JSONL file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the file cannot be read, or anything
    /// [`Dataset::from_jsonl`] reports.
    pub fn from_jsonl_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_jsonl(&text)
    }

    /// The samples, in order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Append a sample.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The guardrail run for one sample, with its pass/fail judgment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleResult {
    /// Index of the sample in the dataset.
    pub sample_index: usize,
    /// Every guardrail verdict for this sample.
    pub summary: ExecutionSummary,
    /// Whether every expected verdict matched an executed guardrail.
    pub passed: bool,
}

/// Runs guardrails over a dataset and scores the outcome.
#[derive(Debug)]
pub struct Evaluator {
    guardrails: Vec<Guardrail>,
    options: ExecutionOptions,
}

impl Evaluator {
    /// Evaluate these guardrails with default execution options.
    #[must_use]
    pub fn new(guardrails: Vec<Guardrail>) -> Self {
        Self {
            guardrails,
            options: ExecutionOptions::default(),
        }
    }

    /// Override the execution options.
    #[must_use]
    pub const fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Run every sample and build the report.
    ///
    /// Samples run one after another so stateful checks see a stable
    /// order; within a sample the guardrails follow the configured
    /// execution options.
    pub async fn run(&self, dataset: &Dataset) -> EvaluationReport {
        debug!(
            samples = dataset.len(),
            guardrails = self.guardrails.len(),
            "Starting evaluation"
        );
        let mut results = Vec::with_capacity(dataset.len());
        for (index, sample) in dataset.samples().iter().enumerate() {
            results.push(self.run_sample(index, sample).await);
        }
        EvaluationReport::from_results(dataset, &results)
    }

    async fn run_sample(&self, index: usize, sample: &Sample) -> SampleResult {
        let summary = Executor::execute(&self.guardrails, &sample.input, &self.options).await;
        let mut passed = true;
        for (name, should_trip) in &sample.expected {
            match summary
                .results()
                .iter()
                .find(|r| r.guardrail_name == *name)
            {
                Some(result) => {
                    if result.is_triggered() != *should_trip {
                        passed = false;
                    }
                }
                None => {
                    warn!(
                        guardrail = %name,
                        sample = index,
                        "Expectation references a guardrail that did not execute"
                    );
                    passed = false;
                }
            }
        }
        SampleResult {
            sample_index: index,
            summary,
            passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::BlockedPatterns;
    use crate::context::GenerationRequest;
    use crate::guardrail::GuardrailOutput;
    use assert_fs::prelude::*;

    fn input(text: &str) -> GuardrailContext {
        GuardrailContext::from_request(GenerationRequest::from_prompt(text))
    }

    #[test]
    fn jsonl_parses_samples_and_skips_blank_lines() {
        let text = concat!(
            r#"{"input": {"request": {"prompt": "hello"}}, "expected": {"g": false}}"#,
            "\n\n",
            r#"{"input": {"request": {"prompt": "bad stuff"}}, "expected": {"g": true}}"#,
            "\n",
        );
        let dataset = Dataset::from_jsonl(text).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(
            dataset.samples()[0].input.request.prompt.as_deref(),
            Some("hello")
        );
        assert_eq!(dataset.samples()[1].expected.get("g"), Some(&true));
    }

    #[test]
    fn jsonl_errors_name_the_line() {
        let text = concat!(
            r#"{"input": {"request": {"prompt": "ok"}}, "expected": {}}"#,
            "\n\n",
            "{not json}",
            "\n",
        );
        let err = Dataset::from_jsonl(text).unwrap_err();
        assert!(matches!(err, Error::Dataset(_)));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn jsonl_files_load_from_disk() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("eval.jsonl");
        file.write_str(
            r#"{"input": {"request": {"prompt": "from disk"}}, "expected": {"g": false}}"#,
        )
        .unwrap();

        let dataset = Dataset::from_jsonl_file(file.path()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[tokio::test]
    async fn sample_passes_when_verdicts_match_expectations() {
        let guardrails = vec![crate::guardrail::Guardrail::new(
            "blocked",
            BlockedPatterns::new(["forbidden"]),
        )];
        let evaluator = Evaluator::new(guardrails);
        let dataset = Dataset::new(vec![
            Sample::new(input("all clear"), "blocked", false),
            Sample::new(input("very forbidden"), "blocked", true),
            Sample::new(input("forbidden again"), "blocked", false),
        ]);

        let report = evaluator.run(&dataset).await;
        assert_eq!(report.total_samples, 3);
        assert_eq!(report.passed_samples, 2);
    }

    #[tokio::test]
    async fn expectations_for_unknown_guardrails_fail_the_sample() {
        let guardrails = vec![crate::guardrail::Guardrail::from_fn("real", |_| {
            Ok(GuardrailOutput::pass())
        })];
        let evaluator = Evaluator::new(guardrails);
        let dataset = Dataset::new(vec![
            Sample::new(input("x"), "real", false).expect("imaginary", true),
        ]);

        let report = evaluator.run(&dataset).await;
        assert_eq!(report.passed_samples, 0);
    }
}
