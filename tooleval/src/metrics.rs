//! Folding score records into tier and model summaries
//!
//! Summaries are recomputed from the records every time. Floating-point sums
//! are taken over sorted values, so a summary does not depend on the order
//! records arrived in, and neither does the worst-offender list.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::report::{FailureReason, ScoreRecord};

/// Pass threshold override for one tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub tier: u32,
    pub threshold: f64,
}

/// Aggregation knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Minimum argument score for a case to count as a success
    pub pass_threshold: f64,
    /// Per-tier overrides, e.g. a lower bar for graded tiers
    pub tier_thresholds: Vec<TierThreshold>,
    /// How many failing cases to list per summary
    pub worst_offenders: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { pass_threshold: 1.0, tier_thresholds: vec![], worst_offenders: 5 }
    }
}

impl AggregatorConfig {
    #[must_use]
    pub fn with_pass_threshold(mut self, pass_threshold: f64) -> Self {
        self.pass_threshold = pass_threshold;
        self
    }

    #[must_use]
    pub fn with_tier_threshold(mut self, tier: u32, threshold: f64) -> Self {
        self.tier_thresholds.retain(|t| t.tier != tier);
        self.tier_thresholds.push(TierThreshold { tier, threshold });
        self
    }

    #[must_use]
    pub fn with_worst_offenders(mut self, worst_offenders: usize) -> Self {
        self.worst_offenders = worst_offenders;
        self
    }
}

/// A failing case worth looking at first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstOffender {
    pub test_id: String,
    pub tier: u32,
    pub tool_match: bool,
    pub argument_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

/// Scalars shared by tier and model summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total: usize,
    /// Cases with the right tool and a passing argument score
    pub successes: usize,
    pub success_rate: f64,
    pub tool_accuracy: f64,
    /// Over every case; wrong-tool cases contribute 0
    pub mean_argument_score: f64,
    pub mean_latency_ms: f64,
    pub mean_reasoning_tokens: f64,
    pub mean_total_tokens: f64,
    /// Reasoning tokens over total tokens, across all cases
    pub reasoning_ratio: f64,
    pub mean_attempts: f64,
    /// Count of unscoreable cases by failure kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worst: Vec<WorstOffender>,
}

/// Summary of one tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSummary {
    pub tier: u32,
    #[serde(flatten)]
    pub stats: SummaryStats,
}

/// Summary of a whole model run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: String,
    pub overall: SummaryStats,
    pub tiers: BTreeMap<u32, TierSummary>,
}

/// Pure fold from score records to summaries
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    config: AggregatorConfig,
}

impl MetricsAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn pass_threshold_for(&self, tier: u32) -> f64 {
        self.config
            .tier_thresholds
            .iter()
            .find(|t| t.tier == tier)
            .map(|t| t.threshold)
            .unwrap_or(self.config.pass_threshold)
    }

    /// Summarize one tier's records
    pub fn summarize(&self, tier: u32, records: &[ScoreRecord]) -> TierSummary {
        TierSummary { tier, stats: self.stats(records.iter()) }
    }

    /// Summarize a run: overall figures plus one summary per tier present
    pub fn summarize_model(&self, model: &str, records: &[ScoreRecord]) -> ModelSummary {
        let mut by_tier: BTreeMap<u32, Vec<&ScoreRecord>> = BTreeMap::new();
        for record in records {
            by_tier.entry(record.tier).or_default().push(record);
        }

        let tiers = by_tier
            .into_iter()
            .map(|(tier, records)| {
                (tier, TierSummary { tier, stats: self.stats(records.into_iter()) })
            })
            .collect();

        ModelSummary { model: model.to_string(), overall: self.stats(records.iter()), tiers }
    }

    fn stats<'a>(&self, records: impl Iterator<Item = &'a ScoreRecord>) -> SummaryStats {
        let records: Vec<&ScoreRecord> = records.collect();
        let total = records.len();
        if total == 0 {
            return SummaryStats::default();
        }

        let passed = |r: &ScoreRecord| r.passed(self.pass_threshold_for(r.tier));
        let successes = records.iter().filter(|r| passed(r)).count();
        let tool_matches = records.iter().filter(|r| r.tool_match).count();

        let latency: u64 = records.iter().map(|r| r.latency_ms).sum();
        let reasoning: u64 = records.iter().map(|r| r.reasoning_tokens).sum();
        let tokens: u64 = records.iter().map(|r| r.total_tokens).sum();
        let attempts: u64 = records.iter().map(|r| u64::from(r.attempts)).sum();
        let scores = sorted_sum(records.iter().map(|r| r.argument_score));

        let mut failures = BTreeMap::new();
        for failure in records.iter().filter_map(|r| r.failure.as_ref()) {
            *failures.entry(failure.label().to_string()).or_insert(0) += 1;
        }

        let n = total as f64;
        SummaryStats {
            total,
            successes,
            success_rate: successes as f64 / n,
            tool_accuracy: tool_matches as f64 / n,
            mean_argument_score: scores / n,
            mean_latency_ms: latency as f64 / n,
            mean_reasoning_tokens: reasoning as f64 / n,
            mean_total_tokens: tokens as f64 / n,
            reasoning_ratio: if tokens == 0 { 0.0 } else { reasoning as f64 / tokens as f64 },
            mean_attempts: attempts as f64 / n,
            failures,
            worst: self.worst(&records, passed),
        }
    }

    fn worst(
        &self,
        records: &[&ScoreRecord],
        passed: impl Fn(&ScoreRecord) -> bool,
    ) -> Vec<WorstOffender> {
        let mut failing: Vec<&ScoreRecord> =
            records.iter().copied().filter(|r| !passed(r)).collect();
        failing.sort_by(|a, b| offender_order(a, b));
        failing
            .into_iter()
            .take(self.config.worst_offenders)
            .map(|r| WorstOffender {
                test_id: r.test_id.clone(),
                tier: r.tier,
                tool_match: r.tool_match,
                argument_score: r.argument_score,
                failure: r.failure.clone(),
            })
            .collect()
    }
}

/// Lowest score first, wrong tool before right tool, then by identity
fn offender_order(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    a.argument_score
        .total_cmp(&b.argument_score)
        .then(a.tool_match.cmp(&b.tool_match))
        .then(a.tier.cmp(&b.tier))
        .then_with(|| a.test_id.cmp(&b.test_id))
        .then_with(|| {
            let reason = |r: &ScoreRecord| r.failure.as_ref().map(ToString::to_string);
            reason(a).cmp(&reason(b))
        })
}

fn sorted_sum(values: impl Iterator<Item = f64>) -> f64 {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, tier: u32, tool_match: bool, score: f64, latency_ms: u64) -> ScoreRecord {
        ScoreRecord {
            test_id: id.to_string(),
            tier,
            expected_tool: "t".to_string(),
            observed_tool: tool_match.then(|| "t".to_string()),
            tool_match,
            argument_score: if tool_match { score } else { 0.0 },
            mismatches: vec![],
            latency_ms,
            reasoning_tokens: 10,
            total_tokens: 40,
            thinking_ratio: 0.25,
            attempts: 1,
            failure: None,
            tags: vec![],
        }
    }

    fn sample() -> Vec<ScoreRecord> {
        vec![
            record("a", 1, true, 1.0, 100),
            record("b", 1, true, 0.5, 300),
            record("c", 1, false, 0.0, 200),
            record("d", 1, true, 0.1, 400),
        ]
    }

    #[test]
    fn test_summarize_scalars() {
        let summary = MetricsAggregator::default().summarize(1, &sample());
        let stats = &summary.stats;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.success_rate, 0.25);
        assert_eq!(stats.tool_accuracy, 0.75);
        assert!((stats.mean_argument_score - 0.4).abs() < 1e-12);
        assert_eq!(stats.mean_latency_ms, 250.0);
        assert_eq!(stats.reasoning_ratio, 0.25);
        assert_eq!(stats.mean_attempts, 1.0);
    }

    #[test]
    fn test_worst_offenders_order() {
        let aggregator =
            MetricsAggregator::new(AggregatorConfig::default().with_worst_offenders(2));
        let summary = aggregator.summarize(1, &sample());
        let ids: Vec<_> = summary.stats.worst.iter().map(|w| w.test_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn test_order_independent() {
        let aggregator = MetricsAggregator::default();
        let records = sample();
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(aggregator.summarize(1, &records), aggregator.summarize(1, &reversed));
    }

    #[test]
    fn test_tier_threshold_override() {
        let aggregator =
            MetricsAggregator::new(AggregatorConfig::default().with_tier_threshold(1, 0.5));
        assert_eq!(aggregator.pass_threshold_for(1), 0.5);
        assert_eq!(aggregator.pass_threshold_for(2), 1.0);
        assert_eq!(aggregator.summarize(1, &sample()).stats.successes, 2);
    }

    #[test]
    fn test_empty_summary() {
        let summary = MetricsAggregator::default().summarize(3, &[]);
        assert_eq!(summary.tier, 3);
        assert_eq!(summary.stats, SummaryStats::default());
    }

    #[test]
    fn test_model_rollup() {
        let mut records = sample();
        records.push(record("e", 2, true, 1.0, 100));
        let mut failed = record("f", 2, false, 0.0, 0);
        failed.failure = Some(FailureReason::CollaboratorTimeout { timeout_ms: 1000 });
        records.push(failed);

        let summary = MetricsAggregator::default().summarize_model("m", &records);
        assert_eq!(summary.model, "m");
        assert_eq!(summary.overall.total, 6);
        assert_eq!(summary.tiers.len(), 2);
        assert_eq!(summary.tiers[&2].stats.total, 2);
        assert_eq!(summary.overall.failures.get("timeout"), Some(&1));
    }

    #[test]
    fn test_tier_summary_serializes_flat() {
        let summary = MetricsAggregator::default().summarize(1, &sample());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["tier"], 1);
        assert_eq!(json["total"], 4);
    }
}
