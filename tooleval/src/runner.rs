//! Tier runner
//!
//! Drives cases through session, comparator and aggregator. Cases within a
//! tier run on a bounded pool; tiers run one after another and independently.
//! A case that fails in any way still yields exactly one [`ScoreRecord`].

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::case::{ExpectedCase, group_by_tier};
use crate::comparator::Comparator;
use crate::config::EvalConfig;
use crate::error::{Result, SchemaError};
use crate::metrics::MetricsAggregator;
use crate::model::ModelClient;
use crate::registry::ToolRegistry;
use crate::report::{FailureReason, ResultSink, RunReport, ScoreRecord, TierReport};
use crate::schema::ToolSchema;
use crate::session::{InvocationSession, SessionCounters};

/// Tools offered to a case that does not name its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPresentation {
    /// Every registered tool
    #[default]
    All,
    /// Registered tools of the case's tier, plus the accepted tools
    SameTier,
}

/// Runs cases for one model
pub struct TierRunner {
    registry: Arc<ToolRegistry>,
    session: InvocationSession,
    comparator: Comparator,
    aggregator: MetricsAggregator,
    config: EvalConfig,
}

impl TierRunner {
    pub fn new(
        registry: Arc<ToolRegistry>,
        client: Arc<dyn ModelClient>,
        config: EvalConfig,
    ) -> Self {
        Self {
            session: InvocationSession::new(client, config.retry.clone()),
            comparator: Comparator::new(config.comparator.clone()),
            aggregator: MetricsAggregator::new(config.aggregator.clone()),
            registry,
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        self.session.model_name()
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Latency and token totals across every case run so far
    pub fn counters(&self) -> &Arc<SessionCounters> {
        self.session.counters()
    }

    /// Check the case against its schema and pick the tools to present
    fn prepare(
        &self,
        case: &ExpectedCase,
    ) -> std::result::Result<(&ToolSchema, Vec<ToolSchema>), SchemaError> {
        let schema = self.registry.require(&case.expected_tool)?;
        schema.check_expected(&case.expected_args)?;
        for path in case.equivalents.keys() {
            schema.resolve_str(path)?;
        }
        for name in &case.acceptable_tools {
            self.registry.require(name)?;
        }

        let tools = match case.presented_tools() {
            Some(names) => self.registry.schemas_for(&names)?,
            None => match self.config.presentation {
                ToolPresentation::All => self.registry.iter().cloned().collect(),
                ToolPresentation::SameTier => {
                    let mut tools: Vec<ToolSchema> =
                        self.registry.by_tier(case.tier).into_iter().cloned().collect();
                    for name in case.accepted_tools() {
                        if !tools.iter().any(|t| t.name == name) {
                            tools.push(self.registry.require(name)?.clone());
                        }
                    }
                    tools
                }
            },
        };
        Ok((schema, tools))
    }

    /// Run one case. Never fails: defects and collaborator failures are
    /// recorded on the returned record.
    pub async fn run_case(&self, case: &ExpectedCase) -> ScoreRecord {
        let (schema, tools) = match self.prepare(case) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(case = %case.id, error = %e, "case skipped: schema error");
                return ScoreRecord::failed(case, FailureReason::from(e));
            }
        };

        let observed = self.session.execute(case, &tools).await;
        match self.comparator.score(case, &observed, schema) {
            Ok(record) => {
                tracing::debug!(
                    case = %case.id,
                    tool_match = record.tool_match,
                    argument_score = record.argument_score,
                    mismatches = record.mismatches.len(),
                    "case scored"
                );
                record
            }
            Err(e) => {
                tracing::warn!(case = %case.id, error = %e, "case not scoreable");
                let mut record = ScoreRecord::from_observed(case, &observed);
                record.failure = Some(FailureReason::from(e));
                record
            }
        }
    }

    /// Run every case of a tier; records come back in input order
    #[tracing::instrument(
        skip_all,
        fields(tier = tier, model = %self.model_name(), cases = cases.len())
    )]
    pub async fn run_tier(&self, tier: u32, cases: &[ExpectedCase]) -> TierReport {
        let mut indexed: Vec<(usize, ScoreRecord)> = stream::iter(cases.iter().enumerate())
            .map(|(i, case)| async move { (i, self.run_case(case).await) })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);
        let records: Vec<ScoreRecord> = indexed.into_iter().map(|(_, r)| r).collect();

        let summary = self.aggregator.summarize(tier, &records);
        tracing::info!(
            tier,
            total = summary.stats.total,
            successes = summary.stats.successes,
            tool_accuracy = summary.stats.tool_accuracy,
            mean_argument_score = summary.stats.mean_argument_score,
            "tier complete"
        );
        TierReport { tier, records, summary }
    }

    /// Run all cases tier by tier, ascending
    pub async fn run_all(&self, cases: &[ExpectedCase]) -> RunReport {
        let started_at = chrono::Utc::now();
        let mut tiers = Vec::new();
        for (tier, tier_cases) in group_by_tier(cases) {
            tiers.push(self.run_tier(tier, &tier_cases).await);
        }
        self.finish(started_at, tiers)
    }

    /// Like [`run_all`](Self::run_all), handing each finished tier to `sink`.
    ///
    /// A sink error stops the run; it is the only error this can return.
    pub async fn run_into_sink(
        &self,
        cases: &[ExpectedCase],
        sink: &mut dyn ResultSink,
    ) -> Result<RunReport> {
        let started_at = chrono::Utc::now();
        let mut tiers = Vec::new();
        for (tier, tier_cases) in group_by_tier(cases) {
            let report = self.run_tier(tier, &tier_cases).await;
            sink.accept(&report)?;
            tiers.push(report);
        }
        Ok(self.finish(started_at, tiers))
    }

    fn finish(
        &self,
        started_at: chrono::DateTime<chrono::Utc>,
        tiers: Vec<TierReport>,
    ) -> RunReport {
        let model = self.model_name().to_string();
        let run_id = format!("{}_{}", model, uuid::Uuid::new_v4());

        let records: Vec<ScoreRecord> =
            tiers.iter().flat_map(|t| t.records.iter().cloned()).collect();
        let summary = self.aggregator.summarize_model(&model, &records);
        let completed_at = chrono::Utc::now();
        let duration = (completed_at - started_at).to_std().unwrap_or_default();

        RunReport { run_id, model, started_at, completed_at, duration, tiers, summary }
    }
}
