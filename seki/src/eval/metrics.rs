//! Per-guardrail scoring.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::{Dataset, SampleResult};

/// Confusion counts and derived scores for one guardrail.
///
/// Counts cover only sample/guardrail pairs where the dataset defined an
/// expectation and the guardrail actually executed. Latency figures
/// cover every execution, labeled or not. Raw values are kept unrounded;
/// rendering rounds to three decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailMetrics {
    /// The guardrail these numbers describe.
    pub guardrail_name: String,
    /// Expected trip, got trip.
    pub true_positives: usize,
    /// Expected pass, got trip.
    pub false_positives: usize,
    /// Expected trip, got pass.
    pub false_negatives: usize,
    /// Expected pass, got pass.
    pub true_negatives: usize,
    /// TP / (TP + FP); zero when undefined.
    pub precision: f64,
    /// TP / (TP + FN); zero when undefined.
    pub recall: f64,
    /// Harmonic mean of precision and recall; zero when undefined.
    pub f1: f64,
    /// (TP + TN) / all labeled pairs; zero when undefined.
    pub accuracy: f64,
    /// Mean execution time across all runs.
    pub avg_execution_time: Duration,
    /// Nearest-rank 95th percentile execution time.
    pub p95_execution_time: Duration,
}

impl GuardrailMetrics {
    /// Number of labeled pairs behind the confusion counts.
    #[must_use]
    pub const fn labeled_pairs(&self) -> usize {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    fn from_counts(guardrail_name: String, counts: Counts) -> Self {
        let Counts {
            tp,
            fp,
            fn_,
            tn,
            mut times,
        } = counts;
        times.sort_unstable();
        let avg = if times.is_empty() {
            Duration::ZERO
        } else {
            times.iter().sum::<Duration>().div_f64(times.len() as f64)
        };
        Self {
            guardrail_name,
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            true_negatives: tn,
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, tp + fn_),
            // Same value as 2PR/(P+R), computed without the float divide.
            f1: ratio(2 * tp, 2 * tp + fp + fn_),
            accuracy: ratio(tp + tn, tp + fp + fn_ + tn),
            avg_execution_time: avg,
            p95_execution_time: percentile(&times, 95),
        }
    }
}

#[derive(Default)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
    tn: usize,
    times: Vec<Duration>,
}

/// Score every guardrail that executed at least once.
pub(crate) fn calculate(dataset: &Dataset, results: &[SampleResult]) -> Vec<GuardrailMetrics> {
    let mut by_name: BTreeMap<String, Counts> = BTreeMap::new();
    for result in results {
        let Some(sample) = dataset.samples().get(result.sample_index) else {
            continue;
        };
        for verdict in result.summary.results() {
            let counts = by_name.entry(verdict.guardrail_name.clone()).or_default();
            counts.times.push(verdict.execution_time);
            if let Some(&should_trip) = sample.expected.get(&verdict.guardrail_name) {
                match (should_trip, verdict.is_triggered()) {
                    (true, true) => counts.tp += 1,
                    (false, true) => counts.fp += 1,
                    (true, false) => counts.fn_ += 1,
                    (false, false) => counts.tn += 1,
                }
            }
        }
    }
    by_name
        .into_iter()
        .map(|(name, counts)| GuardrailMetrics::from_counts(name, counts))
        .collect()
}

/// Correct verdicts over all labeled pairs, pooled across guardrails.
pub(crate) fn overall_accuracy(metrics: &[GuardrailMetrics]) -> f64 {
    let correct = metrics
        .iter()
        .map(|m| m.true_positives + m.true_negatives)
        .sum();
    let total = metrics.iter().map(GuardrailMetrics::labeled_pairs).sum();
    ratio(correct, total)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{GenerationRequest, GuardrailContext};
    use crate::eval::Sample;
    use crate::guardrail::{ExecutionSummary, GuardrailOutput, GuardrailResult};

    #[test]
    fn ratio_is_zero_on_zero_denominator() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(3, 4), 0.75);
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let times: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&times, 95), Duration::from_millis(95));
        assert_eq!(percentile(&times, 50), Duration::from_millis(50));
        assert_eq!(percentile(&times[..3], 95), Duration::from_millis(3));
        assert_eq!(percentile(&[], 95), Duration::ZERO);
    }

    #[test]
    fn percentile_of_one_sample_is_that_sample() {
        let times = [Duration::from_millis(7)];
        assert_eq!(percentile(&times, 95), Duration::from_millis(7));
        assert_eq!(percentile(&times, 1), Duration::from_millis(7));
    }

    fn verdict(name: &str, triggered: bool, ms: u64) -> GuardrailResult {
        let output = if triggered {
            GuardrailOutput::tripwire("hit")
        } else {
            GuardrailOutput::pass()
        };
        GuardrailResult::new(name, "1.0.0", output)
            .with_execution_time(Duration::from_millis(ms))
    }

    fn sample(should_trip: Option<bool>) -> Sample {
        let input = GuardrailContext::from_request(GenerationRequest::from_prompt("x"));
        match should_trip {
            Some(trip) => Sample::new(input, "g", trip),
            None => Sample {
                input,
                expected: std::collections::BTreeMap::new(),
            },
        }
    }

    fn result_for(index: usize, triggered: bool, ms: u64) -> SampleResult {
        SampleResult {
            sample_index: index,
            summary: ExecutionSummary::new(vec![verdict("g", triggered, ms)]),
            passed: true,
        }
    }

    #[test]
    fn confusion_counts_cover_only_labeled_executed_pairs() {
        let dataset = Dataset::new(vec![
            sample(Some(true)),  // tripped: TP
            sample(Some(false)), // tripped: FP
            sample(Some(true)),  // passed: FN
            sample(Some(false)), // passed: TN
            sample(None),        // unlabeled, counts nowhere
        ]);
        let results = vec![
            result_for(0, true, 10),
            result_for(1, true, 20),
            result_for(2, false, 30),
            result_for(3, false, 40),
            result_for(4, true, 50),
        ];

        let metrics = calculate(&dataset, &results);
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0];
        assert_eq!(
            (
                m.true_positives,
                m.false_positives,
                m.false_negatives,
                m.true_negatives
            ),
            (1, 1, 1, 1)
        );
        assert_eq!(m.labeled_pairs(), 4);
        // Latency still counts the unlabeled run.
        assert_eq!(m.avg_execution_time, Duration::from_millis(30));
    }

    #[test]
    fn scores_with_no_labels_are_zero_not_nan() {
        let dataset = Dataset::new(vec![sample(None)]);
        let results = vec![result_for(0, true, 5)];
        let metrics = calculate(&dataset, &results);
        let m = &metrics[0];
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 0.0);
    }
}
