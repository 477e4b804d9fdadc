//! Evaluation rollup and rendering.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::metrics::{calculate, overall_accuracy};
use super::{Dataset, GuardrailMetrics, SampleResult};

/// F1 at or above this marks a guardrail as strong.
const STRONG_F1: f64 = 0.9;
/// F1 below this marks a guardrail as weak.
const WEAK_F1: f64 = 0.7;
/// Precision below this (with real false positives) draws a
/// recommendation.
const PRECISION_FLOOR: f64 = 0.7;
/// Recall below this (with real false negatives) draws a recommendation.
const RECALL_FLOOR: f64 = 0.7;
/// P95 latency above this draws a recommendation.
const SLOW_P95: Duration = Duration::from_millis(1000);

/// Scores for a whole evaluation run.
///
/// Metrics are sorted by F1, best first. Float scores are stored raw;
/// [`fmt::Display`] rounds to three decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Per-guardrail scores, best F1 first.
    pub metrics: Vec<GuardrailMetrics>,
    /// Number of samples evaluated.
    pub total_samples: usize,
    /// Samples whose every expectation matched.
    pub passed_samples: usize,
    /// Correct verdicts over all labeled pairs, pooled.
    pub overall_accuracy: f64,
    /// Guardrails with F1 at or above the strong threshold.
    pub strong: Vec<String>,
    /// Guardrails with F1 below the weak threshold.
    pub weak: Vec<String>,
    /// Plain-language tuning advice.
    pub recommendations: Vec<String>,
}

impl EvaluationReport {
    pub(crate) fn from_results(dataset: &Dataset, results: &[SampleResult]) -> Self {
        let mut metrics = calculate(dataset, results);
        metrics.sort_by(|a, b| b.f1.total_cmp(&a.f1));
        let (strong, weak, recommendations) = assess(&metrics);
        Self {
            overall_accuracy: overall_accuracy(&metrics),
            total_samples: dataset.len(),
            passed_samples: results.iter().filter(|r| r.passed).count(),
            metrics,
            strong,
            weak,
            recommendations,
        }
    }
}

fn assess(metrics: &[GuardrailMetrics]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut strong = Vec::new();
    let mut weak = Vec::new();
    let mut recommendations = Vec::new();
    for m in metrics {
        if m.labeled_pairs() > 0 {
            if m.f1 >= STRONG_F1 {
                strong.push(m.guardrail_name.clone());
            } else if m.f1 < WEAK_F1 {
                weak.push(m.guardrail_name.clone());
            }
            if m.precision < PRECISION_FLOOR && m.false_positives > 0 {
                recommendations.push(format!(
                    "'{}' has too many false positives (precision {:.3})",
                    m.guardrail_name, m.precision
                ));
            }
            if m.recall < RECALL_FLOOR && m.false_negatives > 0 {
                recommendations.push(format!(
                    "'{}' is missing true violations (recall {:.3})",
                    m.guardrail_name, m.recall
                ));
            }
        }
        if m.p95_execution_time > SLOW_P95 {
            recommendations.push(format!(
                "'{}' is slow (p95 {}ms); consider optimization",
                m.guardrail_name,
                m.p95_execution_time.as_millis()
            ));
        }
    }
    (strong, weak, recommendations)
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Guardrail Evaluation ===")?;
        writeln!(
            f,
            "Samples:          {} ({} passed)",
            self.total_samples, self.passed_samples
        )?;
        writeln!(f, "Overall accuracy: {:.3}", self.overall_accuracy)?;
        for m in &self.metrics {
            writeln!(f)?;
            writeln!(f, "{}: F1 {:.3}", m.guardrail_name, m.f1)?;
            writeln!(
                f,
                "  precision {:.3}  recall {:.3}  accuracy {:.3}",
                m.precision, m.recall, m.accuracy
            )?;
            writeln!(
                f,
                "  tp {} / fp {} / fn {} / tn {}",
                m.true_positives, m.false_positives, m.false_negatives, m.true_negatives
            )?;
            writeln!(
                f,
                "  latency avg {}ms, p95 {}ms",
                m.avg_execution_time.as_millis(),
                m.p95_execution_time.as_millis()
            )?;
        }
        if !self.strong.is_empty() {
            writeln!(f, "\nStrong: {}", self.strong.join(", "))?;
        }
        if !self.weak.is_empty() {
            writeln!(f, "\nWeak: {}", self.weak.join(", "))?;
        }
        if !self.recommendations.is_empty() {
            writeln!(f, "\nRecommendations:")?;
            for rec in &self.recommendations {
                writeln!(f, "  - {rec}")?;
            }
        }
        Ok(())
    }
}
