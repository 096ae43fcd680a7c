//! Per-case records, tier and run reports, and result sinks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::case::ExpectedCase;
use crate::comparator::Mismatch;
use crate::error::{EvalError, Result, SchemaError};
use crate::metrics::{ModelSummary, TierSummary};
use crate::session::ObservedResult;

/// Why a case produced no scoreable call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The per-case time budget ran out
    CollaboratorTimeout { timeout_ms: u64 },
    /// Every attempt was rejected
    CollaboratorExhausted { attempts: u32, last_error: String },
    /// The collaborator failed outright
    Collaborator { message: String },
    /// The case or its schema is defective; the model was not at fault
    Schema { message: String },
}

impl FailureReason {
    /// Whether the failure is a test-authoring defect rather than a model outcome
    pub fn is_schema_defect(&self) -> bool {
        matches!(self, FailureReason::Schema { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::CollaboratorTimeout { .. } => "timeout",
            FailureReason::CollaboratorExhausted { .. } => "exhausted",
            FailureReason::Collaborator { .. } => "collaborator",
            FailureReason::Schema { .. } => "schema",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CollaboratorTimeout { timeout_ms } => {
                write!(f, "timed out after {timeout_ms} ms")
            }
            FailureReason::CollaboratorExhausted { attempts, last_error } => {
                write!(f, "no valid call after {attempts} attempt(s): {last_error}")
            }
            FailureReason::Collaborator { message } => write!(f, "collaborator error: {message}"),
            FailureReason::Schema { message } => write!(f, "schema error: {message}"),
        }
    }
}

impl From<&EvalError> for FailureReason {
    fn from(err: &EvalError) -> Self {
        match err {
            EvalError::CollaboratorTimeout { timeout } => {
                FailureReason::CollaboratorTimeout { timeout_ms: timeout.as_millis() as u64 }
            }
            EvalError::CollaboratorExhausted { attempts, last_error } => {
                FailureReason::CollaboratorExhausted {
                    attempts: *attempts,
                    last_error: last_error.clone(),
                }
            }
            EvalError::Schema(e) => FailureReason::Schema { message: e.to_string() },
            other => FailureReason::Collaborator { message: other.to_string() },
        }
    }
}

impl From<SchemaError> for FailureReason {
    fn from(err: SchemaError) -> Self {
        FailureReason::Schema { message: err.to_string() }
    }
}

/// Outcome of one test case. `argument_score` is 0 whenever `tool_match` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub test_id: String,
    pub tier: u32,
    pub expected_tool: String,
    pub observed_tool: Option<String>,
    pub tool_match: bool,
    pub argument_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<Mismatch>,
    pub latency_ms: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
    pub thinking_ratio: f64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ScoreRecord {
    /// A record carrying the observation's figures, not yet scored
    pub fn from_observed(case: &ExpectedCase, observed: &ObservedResult) -> Self {
        Self {
            test_id: case.id.clone(),
            tier: case.tier,
            expected_tool: case.expected_tool.clone(),
            observed_tool: observed.tool_name.clone(),
            tool_match: false,
            argument_score: 0.0,
            mismatches: vec![],
            latency_ms: observed.latency_ms,
            reasoning_tokens: observed.reasoning_tokens,
            total_tokens: observed.total_tokens,
            thinking_ratio: observed.thinking_ratio(),
            attempts: observed.attempts,
            failure: observed.failure.clone(),
            tags: case.tags.clone(),
        }
    }

    /// A record for a case that could not be scored at all
    pub fn failed(case: &ExpectedCase, reason: FailureReason) -> Self {
        let observed = ObservedResult::absent(reason);
        Self::from_observed(case, &observed)
    }

    /// Correct tool and an argument score at or above the threshold
    pub fn passed(&self, threshold: f64) -> bool {
        self.tool_match && self.argument_score >= threshold - 1e-9
    }
}

/// All records of one tier plus their summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierReport {
    pub tier: u32,
    pub records: Vec<ScoreRecord>,
    pub summary: TierSummary,
}

/// Complete report for one model run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier for this run
    pub run_id: String,
    pub model: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub duration: Duration,
    pub tiers: Vec<TierReport>,
    pub summary: ModelSummary,
}

impl RunReport {
    /// Every record of the run, tiers in ascending order
    pub fn records(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.tiers.iter().flat_map(|t| t.records.iter())
    }

    pub fn total_cases(&self) -> usize {
        self.tiers.iter().map(|t| t.records.len()).sum()
    }

    /// Format as a human-readable string
    pub fn format_summary(&self) -> String {
        let overall = &self.summary.overall;
        let mut output = String::new();
        output.push_str(&format!("Tool-call evaluation: {} ({})\n", self.model, self.run_id));
        output.push_str(&format!("Duration: {:?}\n", self.duration));
        output.push_str("\nOverall:\n");
        output.push_str(&format!("  Cases: {}\n", overall.total));
        output.push_str(&format!("  Success Rate: {:.1}%\n", overall.success_rate * 100.0));
        output.push_str(&format!("  Tool Accuracy: {:.1}%\n", overall.tool_accuracy * 100.0));
        output.push_str(&format!("  Mean Argument Score: {:.3}\n", overall.mean_argument_score));
        output.push_str(&format!("  Mean Latency: {:.0} ms\n", overall.mean_latency_ms));
        output.push_str(&format!("  Reasoning Ratio: {:.1}%\n", overall.reasoning_ratio * 100.0));

        if !self.summary.tiers.is_empty() {
            output.push_str("\nTiers:\n");
            for (tier, summary) in &self.summary.tiers {
                let stats = &summary.stats;
                output.push_str(&format!(
                    "  Tier {}: {}/{} passed, tool {:.1}%, args {:.3}, {:.0} ms\n",
                    tier,
                    stats.successes,
                    stats.total,
                    stats.tool_accuracy * 100.0,
                    stats.mean_argument_score,
                    stats.mean_latency_ms
                ));
            }
        }

        if !overall.worst.is_empty() {
            output.push_str("\nWorst Cases:\n");
            for worst in &overall.worst {
                output.push_str(&format!(
                    "  - {} (tier {}): {:.3}",
                    worst.test_id, worst.tier, worst.argument_score
                ));
                if let Some(failure) = &worst.failure {
                    output.push_str(&format!(" [{failure}]"));
                }
                output.push('\n');
            }
        }

        output
    }

    /// Export to JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Receives each tier's records and summary once the tier completes
pub trait ResultSink {
    fn accept(&mut self, report: &TierReport) -> Result<()>;
}

/// Keeps tier reports in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub reports: Vec<TierReport>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.reports.iter().flat_map(|r| r.records.iter())
    }
}

impl ResultSink for MemorySink {
    fn accept(&mut self, report: &TierReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonlLine<'a> {
    Record(&'a ScoreRecord),
    Summary(&'a TierSummary),
}

/// Appends one JSON line per record, then one summary line per tier
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Open (or create) the file for appending, creating parent directories
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &JsonlLine<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl ResultSink for JsonlSink {
    fn accept(&mut self, report: &TierReport) -> Result<()> {
        for record in &report.records {
            self.write_line(&JsonlLine::Record(record))?;
        }
        self.write_line(&JsonlLine::Summary(&report.summary))?;
        self.writer.flush()?;
        Ok(())
    }
}
